//! Server-side LOB handle.
//!
//! A `Lob` wraps a locator. Row fetches defer LOB content: the fetched row
//! carries the locator and the application pulls bytes on demand, which
//! requires the owning connection to still be open and idle. Any mutation
//! invalidates the locator's cached length.

use crate::connection::{ConnInner, Connection};
use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::messages::LobOpMessage;
use crate::protocol::types::{LobLocator, LobValue, OracleType};
use std::sync::{Arc, Weak};

/// A handle to a server-side LOB.
pub struct Lob {
    conn: Weak<ConnInner>,
    locator: LobLocator,
    is_clob: bool,
    is_temporary: bool,
}

impl Lob {
    /// Wrap a LOB value fetched in a row.
    pub fn from_value(conn: &Connection, value: &LobValue) -> Self {
        let is_clob = !value.locator.is_blob();
        Self {
            conn: conn.downgrade(),
            locator: value.locator.clone(),
            is_clob,
            is_temporary: value.locator.is_temp(),
        }
    }

    /// Create a temporary LOB of the given type.
    pub(crate) async fn create_temporary(
        conn: &Connection,
        db_type: OracleType,
    ) -> Result<Self> {
        let (ora_type_num, is_clob) = match db_type {
            OracleType::Clob | OracleType::Nclob => (ORA_TYPE_NUM_CLOB, true),
            OracleType::Blob => (ORA_TYPE_NUM_BLOB, false),
            other => {
                return Err(Error::interface(format!(
                    "cannot create a temporary LOB of type {}",
                    other
                )))
            }
        };

        let inner = conn.inner().clone();
        let empty = LobLocator::empty();
        let msg = LobOpMessage::create_temp(&empty.locator, ora_type_num);
        let mut parser = inner.new_parser();
        inner.process_check(&msg, &mut parser).await?;

        let locator_bytes = parser
            .state
            .lob_data
            .take()
            .ok_or_else(|| Error::protocol("temporary LOB created without a locator"))?;
        Ok(Self {
            conn: conn.downgrade(),
            locator: LobLocator::new(locator_bytes, 0, 8192, true),
            is_clob,
            is_temporary: true,
        })
    }

    fn conn(&self) -> Result<Arc<ConnInner>> {
        self.conn.upgrade().ok_or(Error::ConnectionClosed)
    }

    /// Raw locator bytes.
    pub fn locator(&self) -> &LobLocator {
        &self.locator
    }

    /// Whether this handle wraps a character LOB.
    pub fn is_clob(&self) -> bool {
        self.is_clob
    }

    /// Whether this is a temporary LOB.
    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    /// Chunk size the server recommends for read/write operations.
    pub fn chunk_size(&self) -> u32 {
        if self.locator.chunk_size != 0 {
            self.locator.chunk_size
        } else {
            8192
        }
    }

    /// Current length in characters (CLOB) or bytes (BLOB). Served from the
    /// cached value when it is still valid.
    pub async fn size(&mut self) -> Result<u64> {
        if self.locator.has_metadata {
            return Ok(self.locator.size);
        }
        let conn = self.conn()?;
        let msg = LobOpMessage::get_length(&self.locator.locator);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await?;
        let size = parser
            .state
            .error_info
            .as_ref()
            .map(|info| info.row_count)
            .unwrap_or_default();
        self.locator.size = size;
        self.locator.has_metadata = true;
        Ok(size)
    }

    /// Read up to `amount` bytes/characters starting at 1-based `offset`.
    /// Returns the data and whether more remains past the read window.
    pub async fn read(&mut self, offset: u64, amount: u64) -> Result<(Vec<u8>, bool)> {
        if offset == 0 {
            return Err(Error::interface("LOB offsets are 1-based"));
        }
        let conn = self.conn()?;
        let msg = LobOpMessage::read(&self.locator.locator, offset, amount);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await?;

        let data = parser.state.lob_data.take().unwrap_or_default();
        let total = self.size().await?;
        let consumed = offset.saturating_sub(1) + amount;
        Ok((data, consumed < total))
    }

    /// Read the entire LOB.
    pub async fn read_all(&mut self) -> Result<Vec<u8>> {
        let total = self.size().await?;
        let chunk = self.chunk_size() as u64;
        let mut out = Vec::new();
        let mut offset = 1u64;
        while offset <= total {
            let (data, more) = self.read(offset, chunk).await?;
            if data.is_empty() {
                break;
            }
            out.extend_from_slice(&data);
            offset += chunk;
            if !more {
                break;
            }
        }
        Ok(out)
    }

    /// Write `data` at 1-based `offset`.
    pub async fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset == 0 {
            return Err(Error::interface("LOB offsets are 1-based"));
        }
        let conn = self.conn()?;
        let msg = LobOpMessage::write(&self.locator.locator, offset, data);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await?;
        self.locator.invalidate_metadata();
        Ok(())
    }

    /// Truncate to `new_length`.
    pub async fn trim(&mut self, new_length: u64) -> Result<()> {
        let conn = self.conn()?;
        let msg = LobOpMessage::trim(&self.locator.locator, new_length);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await?;
        self.locator.invalidate_metadata();
        Ok(())
    }

    /// Open the LOB, batching multiple writes into one open/close span.
    pub async fn open(&mut self) -> Result<()> {
        let conn = self.conn()?;
        let msg = LobOpMessage::open(&self.locator.locator);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await
    }

    /// Close a previously opened LOB.
    pub async fn close(&mut self) -> Result<()> {
        let conn = self.conn()?;
        let msg = LobOpMessage::close(&self.locator.locator);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await
    }

    /// Free a temporary LOB's server-side storage immediately.
    pub async fn free_temporary(&mut self) -> Result<()> {
        if !self.is_temporary {
            return Ok(());
        }
        let conn = self.conn()?;
        let msg = LobOpMessage::free_temp(&self.locator.locator);
        let mut parser = conn.new_parser();
        conn.process_check(&msg, &mut parser).await?;
        self.is_temporary = false;
        Ok(())
    }
}

impl Drop for Lob {
    fn drop(&mut self) {
        // Defer the server-side free to the next round trip.
        if self.is_temporary {
            if let Some(conn) = self.conn.upgrade() {
                let locator = self.locator.locator.clone();
                if let Ok(mut engine) = conn.engine.try_lock() {
                    engine.defer_free_temp_lob(locator);
                }
            }
        }
    }
}

impl std::fmt::Debug for Lob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lob")
            .field("is_clob", &self.is_clob)
            .field("is_temporary", &self.is_temporary)
            .field("size", &self.locator.size)
            .finish()
    }
}
