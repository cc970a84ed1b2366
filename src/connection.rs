//! Connection API.
//!
//! A `Connection` owns its transport, protocol engine, statement cache and
//! object type cache. Cursors hold a weak reference back to the connection;
//! the per-connection async mutex around the engine keeps exactly one
//! message in flight.

use crate::cursor::Cursor;
use crate::dbobject::{DbObjectType, TypeCache};
use crate::error::{Error, Result};
use crate::lob::Lob;
use crate::protocol::auth::{
    self, authenticate, fast_auth, AuthCredentials, AuthMode, SessionData,
};
use crate::protocol::capabilities::{Capabilities, ConnectionCookie};
use crate::protocol::connect::{self, Description};
use crate::protocol::constants::*;
use crate::protocol::engine::{BreakSignal, Engine, EngineState};
use crate::protocol::message::Message;
use crate::protocol::messages::SimpleFunctionMessage;
use crate::protocol::response::ResponseParser;
use crate::protocol::transport::TlsParams;
use crate::protocol::types::{OracleType, OutputTypeHandler};
use crate::statement::StatementCache;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;

/// DRCP session purity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Purity {
    /// Server default: self for pooled connections, new otherwise.
    #[default]
    Default,
    /// Always a brand-new session.
    New,
    /// Reuse a session with matching state.
    Self_,
}

impl Purity {
    pub(crate) fn wire_value(self) -> u32 {
        match self {
            Purity::Default => PURITY_DEFAULT,
            Purity::New => PURITY_NEW,
            Purity::Self_ => PURITY_SELF,
        }
    }
}

/// Parameters for opening a connection.
#[derive(Clone)]
pub struct ConnectParams {
    /// EZConnect string or full `(DESCRIPTION=...)` descriptor.
    pub connect_string: String,
    pub username: String,
    pub password: String,
    /// Bearer token for IAM authentication, instead of a password.
    pub token: Option<String>,
    /// Callback producing a fresh access token when the held one expires.
    pub access_token_callback: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    /// Administrative privilege for logon.
    pub auth_mode: AuthMode,
    /// DRCP purity.
    pub purity: Purity,
    /// Subscribe to server events (unsupported in the thin core).
    pub events: bool,
    /// Edition for edition-based redefinition.
    pub edition: Option<String>,
    /// DRCP session tag.
    pub tag: Option<String>,
    /// Keep out-of-band breaks off even where they would be usable.
    pub disable_oob: bool,
    /// Statement cache capacity; 0 disables caching.
    pub stmt_cache_size: usize,
    /// Bound on each database round trip.
    pub call_timeout: Option<Duration>,
    /// Fetch NUMBER columns as decimal strings by default.
    pub fetch_decimals: bool,
    /// TLS settings for tcps endpoints.
    pub tls: TlsParams,
}

impl ConnectParams {
    /// Parameters with username/password credentials.
    pub fn new(
        connect_string: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            connect_string: connect_string.into(),
            username: username.into(),
            password: password.into(),
            token: None,
            access_token_callback: None,
            auth_mode: AuthMode::Default,
            purity: Purity::Default,
            events: false,
            edition: None,
            tag: None,
            disable_oob: false,
            stmt_cache_size: DEFAULT_STMT_CACHE_SIZE,
            call_timeout: None,
            fetch_decimals: false,
            tls: TlsParams::default(),
        }
    }

    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_stmt_cache_size(mut self, size: usize) -> Self {
        self.stmt_cache_size = size;
        self
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("connect_string", &self.connect_string)
            .field("username", &self.username)
            .field("auth_mode", &self.auth_mode)
            .field("purity", &self.purity)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ConnInner {
    pub(crate) engine: TokioMutex<Engine>,
    pub(crate) caps: Capabilities,
    pub(crate) session: SessionData,
    pub(crate) break_signal: Arc<BreakSignal>,
    pub(crate) stmt_cache: StdMutex<StatementCache>,
    pub(crate) type_cache: StdMutex<TypeCache>,
    pub(crate) output_type_handler: StdMutex<Option<OutputTypeHandler>>,
    pub(crate) autocommit: AtomicBool,
    pub(crate) closed: AtomicBool,
    /// Call timeout in milliseconds; 0 means unbounded.
    call_timeout_ms: AtomicU64,
    pub(crate) fetch_decimals: bool,
    pub(crate) tag: Option<String>,
    pub(crate) connected_host: String,
    /// Whether the server session is DRCP-pooled.
    pub(crate) drcp_session: bool,
}

impl ConnInner {
    pub(crate) fn call_timeout(&self) -> Option<Duration> {
        match self.call_timeout_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Run one message through the engine. Server errors are left in the
    /// parser state for the caller to interpret; transport errors surface
    /// directly. Session-dead server errors force-close the socket.
    pub(crate) async fn process(
        &self,
        msg: &dyn Message,
        parser: &mut ResponseParser,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }

        let mut engine = self.engine.lock().await;
        engine.call_timeout = self.call_timeout();
        if let Ok(mut cache) = self.stmt_cache.lock() {
            for cursor_id in cache.take_tombstones() {
                engine.defer_close_cursor(cursor_id);
            }
        }

        let result = engine.process(msg, parser).await;

        if engine.state() == EngineState::Closed {
            self.closed.store(true, Ordering::Release);
        }
        if let Some(info) = &parser.state.error_info {
            if info.is_error() {
                let err = info.to_error();
                if err.is_session_dead() {
                    warn!(
                        "ORA-{:05} classified session-dead; closing socket",
                        info.error_num
                    );
                    engine.force_close().await;
                    self.closed.store(true, Ordering::Release);
                }
            }
        }
        result
    }

    /// Run one message and raise any server error it returns.
    pub(crate) async fn process_check(
        &self,
        msg: &dyn Message,
        parser: &mut ResponseParser,
    ) -> Result<()> {
        self.process(msg, parser).await?;
        if let Some(info) = &parser.state.error_info {
            if info.is_error() {
                return Err(info.to_error());
            }
        }
        Ok(())
    }

    pub(crate) fn new_parser(&self) -> ResponseParser {
        ResponseParser::new(
            self.caps.ttc_field_version,
            self.caps.server_ttc_field_version,
        )
    }
}

/// An open database connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    /// Connect with an EZConnect string and password credentials.
    pub async fn connect(
        connect_string: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        Self::connect_with_params(ConnectParams::new(connect_string, username, password)).await
    }

    /// Connect with full parameters.
    pub async fn connect_with_params(params: ConnectParams) -> Result<Self> {
        if params.events {
            return Err(Error::NotSupported {
                feature: "event subscriptions",
            });
        }

        let description = Description::parse(&params.connect_string)?;
        let established =
            connect::establish(&description, &params.tls, params.disable_oob).await?;
        let mut transport = established.transport;
        let mut caps = established.caps;

        let mut creds = AuthCredentials::new(&params.username, params.password.clone());
        creds.auth_mode = params.auth_mode;
        creds.purity = params.purity.wire_value();
        creds.edition = params.edition.clone();
        creds.token = match (&params.access_token_callback, &params.token) {
            (Some(callback), _) => Some(callback()),
            (None, Some(token)) => Some(token.clone()),
            (None, None) => None,
        };

        let cookie_key = description.cookie_key();
        if let Some(cookie) = connect::cookie_for(&cookie_key) {
            // A previously seen endpoint: align the field version up front,
            // sparing the negotiation a downgrade round.
            if cookie.populated {
                caps.adjust_for_server_caps(&cookie.compile_caps, &cookie.runtime_caps);
            }
        }
        let session = if caps.supports_fast_auth && creds.token.is_none() {
            let mut session = fast_auth(&mut transport, &mut caps, &creds).await?;
            auth::phase_two(&mut transport, &creds, &mut caps, &mut session).await?;
            session
        } else {
            let banner = auth::negotiate_protocol(&mut transport, &mut caps).await?;
            connect::store_cookie(
                &cookie_key,
                ConnectionCookie {
                    protocol_version: caps.protocol_version,
                    server_banner: banner,
                    charset_id: caps.charset_id,
                    ncharset_id: caps.ncharset_id,
                    flags: 0,
                    compile_caps: caps.compile_caps.clone(),
                    runtime_caps: caps.runtime_caps.clone(),
                    populated: true,
                },
            );
            authenticate(&mut transport, &creds, &mut caps).await?
        };

        let break_signal = BreakSignal::new();
        let mut engine = Engine::new(transport, caps.clone(), break_signal.clone());
        engine.call_timeout = params.call_timeout;

        let drcp_session = session.params.contains_key("AUTH_DRCP_SESSION")
            || params.purity != Purity::Default;
        debug!(
            "session established to {} as {}",
            established.connected_address.host, params.username
        );

        let inner = Arc::new(ConnInner {
            engine: TokioMutex::new(engine),
            caps,
            session,
            break_signal,
            stmt_cache: StdMutex::new(StatementCache::new(params.stmt_cache_size)),
            type_cache: StdMutex::new(TypeCache::new()),
            output_type_handler: StdMutex::new(None),
            autocommit: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            call_timeout_ms: AtomicU64::new(
                params.call_timeout.map_or(0, |t| t.as_millis() as u64),
            ),
            fetch_decimals: params.fetch_decimals,
            tag: params.tag.clone(),
            connected_host: established.connected_address.host.clone(),
            drcp_session,
        });
        Ok(Self { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<ConnInner> {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnInner> {
        Arc::downgrade(&self.inner)
    }

    /// Open a cursor on this connection.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.downgrade(), self.inner.fetch_decimals)
    }

    /// Host the connection finally landed on, after any redirects.
    pub fn host(&self) -> &str {
        &self.inner.connected_host
    }

    /// Negotiated protocol version.
    pub fn protocol_version(&self) -> u16 {
        self.inner.caps.protocol_version
    }

    /// Negotiated SDU.
    pub fn sdu(&self) -> u32 {
        self.inner.caps.sdu
    }

    /// Server version, when the session reported it.
    pub fn server_version(&self) -> Option<(u8, u8, u8, u8, u8)> {
        self.inner
            .session
            .server_version(self.inner.caps.ttc_field_version)
    }

    /// A session parameter returned during logon.
    pub fn session_param(&self, key: &str) -> Option<String> {
        self.inner.session.params.get(key).cloned()
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire)
    }

    /// Auto-commit mode.
    pub fn autocommit(&self) -> bool {
        self.inner.autocommit.load(Ordering::Acquire)
    }

    /// Set auto-commit mode.
    pub fn set_autocommit(&self, autocommit: bool) {
        self.inner.autocommit.store(autocommit, Ordering::Release);
    }

    /// Set the per-call timeout. Takes effect from the next call.
    pub fn set_call_timeout(&self, timeout: Option<Duration>) {
        self.inner.call_timeout_ms.store(
            timeout.map_or(0, |t| t.as_millis() as u64),
            Ordering::Release,
        );
    }

    /// Install a connection-level output type handler. A cursor-level
    /// handler wins over this one.
    pub fn set_output_type_handler(&self, handler: Option<OutputTypeHandler>) {
        if let Ok(mut slot) = self.inner.output_type_handler.lock() {
            *slot = handler;
        }
    }

    /// Commit the current transaction.
    pub async fn commit(&self) -> Result<()> {
        let mut parser = self.inner.new_parser();
        self.inner
            .process_check(&SimpleFunctionMessage::commit(), &mut parser)
            .await
    }

    /// Roll back the current transaction.
    pub async fn rollback(&self) -> Result<()> {
        let mut parser = self.inner.new_parser();
        self.inner
            .process_check(&SimpleFunctionMessage::rollback(), &mut parser)
            .await
    }

    /// Cheap server round trip verifying the session is alive.
    pub async fn ping(&self) -> Result<()> {
        let mut parser = self.inner.new_parser();
        self.inner
            .process_check(&SimpleFunctionMessage::ping(), &mut parser)
            .await
    }

    /// Cancel the call in flight, from any task. Idempotent.
    pub fn cancel(&self) {
        self.inner.break_signal.request();
    }

    /// Whether the last call left a transaction open.
    pub async fn transaction_in_progress(&self) -> bool {
        self.inner.engine.lock().await.txn_in_progress
    }

    /// Look up (and cache) an object type by its schema-qualified name.
    pub async fn gettype(&self, name: &str) -> Result<Arc<DbObjectType>> {
        crate::dbobject::get_type(self, name).await
    }

    /// Create a temporary LOB of the given type (Clob, Nclob or Blob).
    pub async fn createlob(&self, db_type: OracleType) -> Result<Lob> {
        Lob::create_temporary(self, db_type).await
    }

    /// Event subscriptions require the thick driver path.
    pub fn subscribe(&self) -> Result<()> {
        Err(Error::NotSupported {
            feature: "event subscriptions",
        })
    }

    /// Execute several statements in a single pipelined round trip.
    ///
    /// Experimental; requires a server with end-of-response support. Results
    /// are tagged by operation index and a failing operation does not abort
    /// the rest.
    pub async fn run_pipeline(&self, sqls: &[&str]) -> Result<Vec<Result<u64>>> {
        use crate::protocol::messages::ExecuteMessage;
        use crate::statement::Statement;

        let statements = sqls
            .iter()
            .map(|sql| Statement::prepare(sql))
            .collect::<Result<Vec<_>>>()?;
        let messages: Vec<ExecuteMessage<'_>> = statements
            .iter()
            .map(|stmt| {
                ExecuteMessage::new(
                    stmt.sql.as_bytes(),
                    0,
                    stmt.is_query(),
                    stmt.is_plsql(),
                    if stmt.is_query() { DEFAULT_PREFETCH_ROWS } else { 0 },
                    self.inner.caps.ttc_field_version,
                )
            })
            .collect();
        let ops: Vec<&dyn Message> = messages.iter().map(|m| m as &dyn Message).collect();
        let mut parsers: Vec<ResponseParser> =
            (0..ops.len()).map(|_| self.inner.new_parser()).collect();

        let mut engine = self.inner.engine.lock().await;
        engine.call_timeout = self.inner.call_timeout();
        let outcomes = engine.process_pipeline(&ops, &mut parsers).await?;
        drop(engine);

        Ok(outcomes
            .into_iter()
            .zip(parsers.iter())
            .map(|(error, parser)| match error {
                Some(e) => Err(e),
                None => Ok(parser
                    .state
                    .error_info
                    .as_ref()
                    .map(|info| info.row_count)
                    .unwrap_or_default()),
            })
            .collect())
    }

    /// Release a DRCP session back to the server-side pool.
    pub(crate) async fn release_drcp_session(&self, deauthenticate: bool) -> Result<()> {
        let tag = self.inner.tag.clone();
        let mut engine = self.inner.engine.lock().await;
        engine.release_session(tag.as_deref(), deauthenticate).await
    }

    /// Close the connection: roll back, log off, shut the socket down.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut engine = self.inner.engine.lock().await;
        if engine.is_ready() {
            if engine.txn_in_progress {
                let mut parser = self.inner.new_parser();
                let _ = engine
                    .process(&SimpleFunctionMessage::rollback(), &mut parser)
                    .await;
            }
            if self.inner.drcp_session {
                let tag = self.inner.tag.clone();
                let _ = engine.release_session(tag.as_deref(), true).await;
            }
        }
        engine.close().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.inner.connected_host)
            .field("open", &self.is_open())
            .finish()
    }
}
