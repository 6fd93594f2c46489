//! Metadata tracker (C9): CRC-gated per-table metadata requests.
//!
//! Re-requesting function-name metadata on every reconnect is wasteful; the
//! gateway publishes a CRC per table in every `GatewayInformation` event,
//! and [`MetadataTracker`] uses it to skip a request when nothing changed.

use std::collections::HashMap;

/// What to do after observing a `GatewayInformation` event for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataAction {
    /// CRC unchanged and table already loaded — skip the request.
    AlreadyLoaded,
    /// Table was previously rejected (`Fail(0x0F)`) — never request again.
    Rejected,
    /// CRC changed or table unseen — (re-)request after the given delay.
    RequestAfter(std::time::Duration),
}

const METADATA_REQUEST_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum TableState {
    #[default]
    Unknown,
    Loaded,
    Rejected,
}

/// Tracks, per `table_id`, whether its metadata is loaded, rejected, or
/// needs a (re-)request, plus the gateway-wide `last_metadata_crc`.
#[derive(Debug, Default)]
pub struct MetadataTracker {
    table_state: HashMap<u8, TableState>,
    /// command_id -> table_id, for in-flight `GetDevicesMetadata` requests.
    pub pending_metadata: HashMap<u16, u8>,
    last_metadata_crc: Option<u32>,
}

impl MetadataTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_metadata_crc(&self) -> Option<u32> {
        self.last_metadata_crc
    }

    /// Applies the CRC-gating policy (spec.md §4.8) for a `GatewayInformation`
    /// event carrying `meta_crc` for `table_id`.
    pub fn on_gateway_information(&mut self, table_id: u8, meta_crc: u32) -> MetadataAction {
        if self.table_state.get(&table_id) == Some(&TableState::Rejected) {
            return MetadataAction::Rejected;
        }

        if meta_crc != 0 && Some(meta_crc) == self.last_metadata_crc {
            self.table_state.insert(table_id, TableState::Loaded);
            return MetadataAction::AlreadyLoaded;
        }

        // CRC changed (or first time): purge cached state for this table.
        self.table_state.remove(&table_id);
        MetadataAction::RequestAfter(METADATA_REQUEST_DELAY)
    }

    /// Registers a just-sent `GetDevicesMetadata` request.
    pub fn record_request(&mut self, command_id: u16, table_id: u8) {
        self.pending_metadata.insert(command_id, table_id);
    }

    /// A status event referenced a `table_id` we've never seen metadata
    /// for. Returns `true` if a fresh request should be issued now.
    pub fn needs_on_demand_request(&self, table_id: u8) -> bool {
        table_id != 0
            && !matches!(
                self.table_state.get(&table_id),
                Some(TableState::Loaded) | Some(TableState::Rejected)
            )
            && !self.pending_metadata.values().any(|&t| t == table_id)
    }

    /// Applies a `SuccessComplete` response: validates the returned CRC
    /// against the `GatewayInformation` CRC for the table (the caller
    /// supplies it, since this tracker doesn't retain per-table CRCs
    /// beyond the most recent gateway-wide value).
    pub fn on_success_complete(&mut self, command_id: u16, returned_crc: u32, expected_crc: u32) {
        let Some(table_id) = self.pending_metadata.remove(&command_id) else {
            return;
        };
        if returned_crc == expected_crc {
            self.table_state.insert(table_id, TableState::Loaded);
            self.last_metadata_crc = Some(returned_crc);
        } else {
            self.table_state.remove(&table_id);
            self.last_metadata_crc = None;
        }
    }

    /// Applies a `Fail` response. `0x0F` marks the table permanently
    /// rejected for this session; any other failure just drops the
    /// pending entry.
    pub fn on_fail(&mut self, command_id: u16, error_code: u8) {
        let Some(table_id) = self.pending_metadata.remove(&command_id) else {
            return;
        };
        if error_code == 0x0F {
            self.table_state.insert(table_id, TableState::Rejected);
        }
    }

    /// Resets all per-table state and `last_metadata_crc`, e.g. for
    /// `refresh_metadata()`.
    pub fn reset(&mut self) {
        self.table_state.clear();
        self.pending_metadata.clear();
        self.last_metadata_crc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unchanged_crc_skips_request_after_first_load() {
        let mut t = MetadataTracker::new();
        assert_eq!(
            t.on_gateway_information(7, 0xAABBCCDD),
            MetadataAction::RequestAfter(Duration::from_millis(500))
        );
        t.record_request(1, 7);
        t.on_success_complete(1, 0xAABBCCDD, 0xAABBCCDD);

        assert_eq!(
            t.on_gateway_information(7, 0xAABBCCDD),
            MetadataAction::AlreadyLoaded
        );
    }

    #[test]
    fn changed_crc_triggers_new_request() {
        let mut t = MetadataTracker::new();
        t.on_gateway_information(7, 0x1111);
        t.record_request(1, 7);
        t.on_success_complete(1, 0x1111, 0x1111);

        assert_eq!(
            t.on_gateway_information(7, 0x2222),
            MetadataAction::RequestAfter(Duration::from_millis(500))
        );
    }

    #[test]
    fn rejected_table_never_requested_again() {
        let mut t = MetadataTracker::new();
        t.on_gateway_information(7, 0x1111);
        t.record_request(1, 7);
        t.on_fail(1, 0x0F);

        assert_eq!(t.on_gateway_information(7, 0x2222), MetadataAction::Rejected);
        assert!(!t.needs_on_demand_request(7));
    }

    #[test]
    fn on_demand_request_fires_for_unseen_table() {
        let t = MetadataTracker::new();
        assert!(t.needs_on_demand_request(3));
        assert!(!t.needs_on_demand_request(0));
    }

    #[test]
    fn mismatched_crc_on_complete_clears_loaded_flag() {
        let mut t = MetadataTracker::new();
        t.on_gateway_information(7, 0xAAAA);
        t.record_request(1, 7);
        t.on_success_complete(1, 0xBBBB, 0xAAAA);

        assert!(t.needs_on_demand_request(7));
        assert_eq!(t.last_metadata_crc(), None);
    }
}
