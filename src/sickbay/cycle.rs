//! Reconciliation cycle state machine
//!
//! Type-safe state machine for one watch cycle using state-machines crate.
//! Uses dynamic dispatch mode since the next event depends on runtime replies.

use state_machines::state_machine;

state_machine! {
    name: CycleMachine,
    dynamic: true,
    initial: Idle,
    states: [Idle, Checking, Healthy, Repairing],
    events {
        check {
            transition: { from: Idle, to: Checking }
        }
        pass {
            transition: { from: Checking, to: Healthy }
        }
        fail {
            transition: { from: Checking, to: Repairing }
        }
        settle {
            transition: { from: [Checking, Healthy, Repairing], to: Idle }
        }
    }
}

/// Cycle phase for logging and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Checking,
    Healthy,
    Repairing,
}

impl Phase {
    fn from_label(s: &str) -> Self {
        match s {
            "Checking" => Phase::Checking,
            "Healthy" => Phase::Healthy,
            "Repairing" => Phase::Repairing,
            _ => Phase::Idle,
        }
    }
}

/// Events driving a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    Check,
    Pass,
    Fail,
    Settle,
}

/// Phase tracker for one container
pub struct Cycle {
    machine: DynamicCycleMachine<()>,
}

impl Cycle {
    pub fn new() -> Self {
        Self {
            machine: CycleMachine::new(()).into_dynamic(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_label(self.machine.current_state())
    }

    /// Apply an event
    pub fn fire(&mut self, event: CycleEvent) -> Result<(), state_machines::DynamicError> {
        let event = match event {
            CycleEvent::Check => CycleMachineEvent::Check,
            CycleEvent::Pass => CycleMachineEvent::Pass,
            CycleEvent::Fail => CycleMachineEvent::Fail,
            CycleEvent::Settle => CycleMachineEvent::Settle,
        };
        self.machine.handle(event)
    }
}

impl Default for Cycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        assert_eq!(Cycle::new().phase(), Phase::Idle);
    }

    #[test]
    fn test_healthy_cycle() {
        let mut cycle = Cycle::new();
        cycle.fire(CycleEvent::Check).unwrap();
        assert_eq!(cycle.phase(), Phase::Checking);
        cycle.fire(CycleEvent::Pass).unwrap();
        assert_eq!(cycle.phase(), Phase::Healthy);
        cycle.fire(CycleEvent::Settle).unwrap();
        assert_eq!(cycle.phase(), Phase::Idle);
    }

    #[test]
    fn test_repair_cycle() {
        let mut cycle = Cycle::new();
        cycle.fire(CycleEvent::Check).unwrap();
        cycle.fire(CycleEvent::Fail).unwrap();
        assert_eq!(cycle.phase(), Phase::Repairing);
        cycle.fire(CycleEvent::Settle).unwrap();
        assert_eq!(cycle.phase(), Phase::Idle);
    }

    #[test]
    fn test_inspect_failure_settles_from_checking() {
        let mut cycle = Cycle::new();
        cycle.fire(CycleEvent::Check).unwrap();
        cycle.fire(CycleEvent::Settle).unwrap();
        assert_eq!(cycle.phase(), Phase::Idle);
    }

    #[test]
    fn test_invalid_transition() {
        let mut cycle = Cycle::new();
        // Can't repair without checking first
        assert!(cycle.fire(CycleEvent::Fail).is_err());
        assert!(cycle.fire(CycleEvent::Settle).is_err());
        assert_eq!(cycle.phase(), Phase::Idle);
    }
}
