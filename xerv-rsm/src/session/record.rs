//! Per-client deduplication record.

use crate::error::{RsmError, RsmResult};
use crate::types::{ClientId, SeriesId};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

/// Outcome of checking whether a command still has to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedup {
    /// The client already acknowledged this series ID. No result is retained.
    Responded,
    /// The command was applied before; this is its result.
    Cached(u64),
    /// The command has not been applied and must be applied now.
    Required,
}

impl Dedup {
    /// Whether the caller must apply the command.
    pub fn must_apply(&self) -> bool {
        matches!(self, Dedup::Required)
    }

    /// Flatten into `(result, responded, must_apply)`.
    pub fn into_parts(self) -> (u64, bool, bool) {
        match self {
            Dedup::Responded => (0, true, false),
            Dedup::Cached(result) => (result, false, false),
            Dedup::Required => (0, false, true),
        }
    }
}

/// A client session: identity, acknowledgement high-water mark and the
/// results of applied commands the client has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    client_id: ClientId,
    responded_to: SeriesId,
    history: BTreeMap<SeriesId, u64>,
}

impl Session {
    /// Create an empty session.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            responded_to: SeriesId::NOOP,
            history: BTreeMap::new(),
        }
    }

    /// The owning client.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Highest series ID the client has acknowledged.
    pub fn responded_to(&self) -> SeriesId {
        self.responded_to
    }

    /// Number of retained results.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Whether `series_id` is at or below the acknowledgement mark.
    pub fn has_responded(&self, series_id: SeriesId) -> bool {
        series_id <= self.responded_to
    }

    /// Retained result for `series_id`, if any.
    pub fn get_response(&self, series_id: SeriesId) -> Option<u64> {
        self.history.get(&series_id).copied()
    }

    /// Decide whether the command identified by `series_id` must be applied.
    pub fn update_required(&self, series_id: SeriesId) -> Dedup {
        if self.has_responded(series_id) {
            return Dedup::Responded;
        }
        match self.get_response(series_id) {
            Some(result) => Dedup::Cached(result),
            None => Dedup::Required,
        }
    }

    /// Abort if a result for `series_id` is already retained.
    pub fn must_not_have_response(&self, series_id: SeriesId) {
        if self.history.contains_key(&series_id) {
            fatal!(
                "{} already has a response for series {}",
                self.client_id,
                series_id
            );
        }
    }

    /// Record the result of applying `series_id`.
    ///
    /// Recording the same series ID twice means the command was applied twice.
    pub fn add_response(&mut self, series_id: SeriesId, result: u64) {
        self.must_not_have_response(series_id);
        self.history.insert(series_id, result);
    }

    /// Raise the acknowledgement mark to `series_id` and drop results at or
    /// below it. Never lowers the mark.
    pub fn clear_to(&mut self, series_id: SeriesId) {
        if series_id <= self.responded_to {
            return;
        }
        match series_id.as_u64().checked_add(1) {
            Some(next) => {
                self.history = self.history.split_off(&SeriesId::new(next));
            }
            None => self.history.clear(),
        }
        self.responded_to = series_id;
    }

    pub(crate) fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.client_id.as_u64())?;
        writer.write_u64::<LittleEndian>(self.responded_to.as_u64())?;
        writer.write_u64::<LittleEndian>(self.history.len() as u64)?;
        for (series_id, result) in &self.history {
            writer.write_u64::<LittleEndian>(series_id.as_u64())?;
            writer.write_u64::<LittleEndian>(*result)?;
        }
        Ok(())
    }

    pub(crate) fn decode<R: Read>(reader: &mut R) -> RsmResult<Self> {
        let truncated = |e: io::Error| RsmError::session_data(format!("truncated session: {}", e));

        let client_id = ClientId::new(reader.read_u64::<LittleEndian>().map_err(truncated)?);
        let responded_to = SeriesId::new(reader.read_u64::<LittleEndian>().map_err(truncated)?);
        let count = reader.read_u64::<LittleEndian>().map_err(truncated)?;

        let mut history = BTreeMap::new();
        for _ in 0..count {
            let series_id = SeriesId::new(reader.read_u64::<LittleEndian>().map_err(truncated)?);
            let result = reader.read_u64::<LittleEndian>().map_err(truncated)?;
            if history.insert(series_id, result).is_some() {
                return Err(RsmError::session_data(format!(
                    "{} has duplicate series {}",
                    client_id, series_id
                )));
            }
        }

        Ok(Self {
            client_id,
            responded_to,
            history,
        })
    }
}
