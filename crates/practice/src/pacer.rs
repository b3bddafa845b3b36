use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingState {
    #[default]
    Idle,
    AwaitingCapture,
    AwaitingPrediction,
}

/// What the driver should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingAction {
    Wait,
    CaptureNow,
    CaptureAfter(Duration),
}

/// The pacing state machine.
///
/// Pure bookkeeping: the session driver feeds it channel and capture events
/// and performs the returned action. A frame may only be sent in
/// `AwaitingCapture`, and sending moves to `AwaitingPrediction`, so at most
/// one frame is ever in flight.
#[derive(Debug, Clone)]
pub struct Pacer {
    state: PacingState,
    frame_delay: Duration,
    not_ready_delay: Duration,
    sent: u64,
    acknowledged: u64,
    abandoned: u64,
}

impl Pacer {
    pub fn new(frame_delay: Duration, not_ready_delay: Duration) -> Self {
        Self {
            state: PacingState::Idle,
            frame_delay,
            not_ready_delay,
            sent: 0,
            acknowledged: 0,
            abandoned: 0,
        }
    }

    pub fn state(&self) -> PacingState {
        self.state
    }

    pub fn may_send(&self) -> bool {
        self.state == PacingState::AwaitingCapture
    }

    /// Frames sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Frames answered by a prediction or a channel error.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    /// Frames lost to a disconnect or stop.
    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }

    /// Edge-triggered: only the first call after `Idle` starts capturing.
    pub fn on_connected(&mut self) -> PacingAction {
        match self.state {
            PacingState::Idle => {
                self.state = PacingState::AwaitingCapture;
                PacingAction::CaptureNow
            }
            _ => PacingAction::Wait,
        }
    }

    /// The source had no frame yet; retry without changing state.
    pub fn on_not_ready(&mut self) -> PacingAction {
        match self.state {
            PacingState::AwaitingCapture => PacingAction::CaptureAfter(self.not_ready_delay),
            _ => PacingAction::Wait,
        }
    }

    /// Capture or encode failed; try again after the frame delay.
    pub fn on_capture_failed(&mut self) -> PacingAction {
        match self.state {
            PacingState::AwaitingCapture => PacingAction::CaptureAfter(self.frame_delay),
            _ => PacingAction::Wait,
        }
    }

    pub fn on_sent(&mut self) -> PacingAction {
        if self.state == PacingState::AwaitingCapture {
            self.state = PacingState::AwaitingPrediction;
            self.sent += 1;
        }
        PacingAction::Wait
    }

    /// The channel refused the frame; nothing is in flight.
    pub fn on_send_skipped(&mut self) -> PacingAction {
        self.on_not_ready()
    }

    /// A prediction or a channel error answered the frame in flight.
    pub fn on_acknowledged(&mut self) -> PacingAction {
        match self.state {
            PacingState::AwaitingPrediction => {
                self.state = PacingState::AwaitingCapture;
                self.acknowledged += 1;
                PacingAction::CaptureAfter(self.frame_delay)
            }
            _ => PacingAction::Wait,
        }
    }

    pub fn on_disconnected(&mut self) -> PacingAction {
        self.halt();
        PacingAction::Wait
    }

    pub fn on_stop(&mut self) -> PacingAction {
        self.halt();
        PacingAction::Wait
    }

    fn halt(&mut self) {
        if self.state == PacingState::AwaitingPrediction {
            self.abandoned += 1;
        }
        self.state = PacingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer() -> Pacer {
        Pacer::new(Duration::from_millis(500), Duration::from_millis(100))
    }

    #[test]
    fn test_connected_is_edge_triggered() {
        let mut pacer = pacer();
        assert_eq!(pacer.on_connected(), PacingAction::CaptureNow);
        assert_eq!(pacer.on_connected(), PacingAction::Wait);
        assert_eq!(pacer.state(), PacingState::AwaitingCapture);
    }

    #[test]
    fn test_not_ready_keeps_state() {
        let mut pacer = pacer();
        pacer.on_connected();
        assert_eq!(
            pacer.on_not_ready(),
            PacingAction::CaptureAfter(Duration::from_millis(100))
        );
        assert_eq!(pacer.state(), PacingState::AwaitingCapture);
        assert_eq!(pacer.sent(), 0);
    }

    #[test]
    fn test_halt_counts_abandoned_frame() {
        let mut pacer = pacer();
        pacer.on_connected();
        pacer.on_sent();
        pacer.on_disconnected();
        assert_eq!(pacer.abandoned(), 1);
        assert_eq!(pacer.state(), PacingState::Idle);
        pacer.on_stop();
        assert_eq!(pacer.abandoned(), 1);
    }
}
