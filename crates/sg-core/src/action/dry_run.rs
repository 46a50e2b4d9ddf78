//! Sink that only logs what it would do.

use sg_common::ProcessId;
use tracing::info;

use super::{ActionError, ActionSink, IoClass};
use crate::response::EscalationLevel;

/// Logs every directive at INFO and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunActionSink;

impl ActionSink for DryRunActionSink {
    fn set_cpu_priority(&self, pid: ProcessId, priority: i32) -> Result<(), ActionError> {
        info!(pid = pid.0, priority, dry_run = true, "would set cpu priority");
        Ok(())
    }

    fn set_io_priority(&self, pid: ProcessId, class: IoClass, level: u8) -> Result<(), ActionError> {
        info!(pid = pid.0, class = %class, level, dry_run = true, "would set io priority");
        Ok(())
    }

    fn advise_memory_pressure(
        &self,
        pid: ProcessId,
        level: EscalationLevel,
    ) -> Result<(), ActionError> {
        info!(pid = pid.0, level = %level, dry_run = true, "would signal memory pressure");
        Ok(())
    }

    fn clear_memory_pressure(&self, pid: ProcessId) -> Result<(), ActionError> {
        info!(pid = pid.0, dry_run = true, "would clear memory pressure");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry_run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_succeeds_and_reads_nothing() {
        let sink = DryRunActionSink;
        assert!(sink.set_cpu_priority(ProcessId(1), -20).is_ok());
        assert!(sink
            .set_io_priority(ProcessId(1), IoClass::Realtime, 4)
            .is_ok());
        assert!(sink
            .advise_memory_pressure(ProcessId(1), EscalationLevel::Critical)
            .is_ok());
        assert_eq!(sink.current_cpu_priority(ProcessId(1)), Ok(None));
    }
}
