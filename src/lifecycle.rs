use serde::{Deserialize, Serialize};

/// Appointment status state machine.
///
/// Pending is the only initial state. Attended (doctor marks the visit done)
/// and Cancelled (patient or admin) are terminal; nothing transitions out of
/// them. Cancelling releases the slot, attending keeps it held so the
/// historical slot can never be booked again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Attended = 1,
    Cancelled = 2,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Attended | AppointmentStatus::Cancelled)
    }

    pub fn can_transition(self, next: AppointmentStatus) -> bool {
        match self {
            AppointmentStatus::Pending => {
                matches!(next, AppointmentStatus::Attended | AppointmentStatus::Cancelled)
            }
            AppointmentStatus::Attended | AppointmentStatus::Cancelled => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Attended => "attended",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppointmentStatus::*;

    #[test]
    fn pending_reaches_both_terminal_states() {
        assert!(Pending.can_transition(Attended));
        assert!(Pending.can_transition(Cancelled));
        assert!(!Pending.can_transition(Pending));
    }

    #[test]
    fn terminal_states_are_sealed() {
        for terminal in [Attended, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Attended, Cancelled] {
                assert!(!terminal.can_transition(next));
            }
        }
        assert!(!Pending.is_terminal());
    }
}
