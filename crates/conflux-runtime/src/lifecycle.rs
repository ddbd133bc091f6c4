//! Cooperative lifecycle state machine shared by extensions and groups.
//!
//! The runtime begins a phase; the entity acknowledges it (`on_*_done`). A
//! phase may only begin from the state right before it, and be acknowledged
//! only while it is running.

use std::fmt;

use conflux_core::error::{ConfluxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Init,
    Configuring,
    Configured,
    Initting,
    Initted,
    Starting,
    Started,
    Stopping,
    Stopped,
    Deinitting,
    Deinitted,
    Destroyed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Init => "init",
            LifecycleState::Configuring => "configuring",
            LifecycleState::Configured => "configured",
            LifecycleState::Initting => "initting",
            LifecycleState::Initted => "initted",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Deinitting => "deinitting",
            LifecycleState::Deinitted => "deinitted",
            LifecycleState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Configure,
    Init,
    Start,
    Stop,
    Deinit,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Configure => "configure",
            Phase::Init => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Deinit => "deinit",
        }
    }

    /// (state the phase begins from, state while it runs, state once done)
    fn states(self) -> (LifecycleState, LifecycleState, LifecycleState) {
        use LifecycleState::*;
        match self {
            Phase::Configure => (Init, Configuring, Configured),
            Phase::Init => (Configured, Initting, Initted),
            Phase::Start => (Initted, Starting, Started),
            Phase::Stop => (Started, Stopping, Stopped),
            Phase::Deinit => (Stopped, Deinitting, Deinitted),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    entity: String,
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            state: LifecycleState::Init,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn violation(&self, action: String) -> ConfluxError {
        tracing::warn!(entity = %self.entity, state = %self.state, %action, "lifecycle violation");
        ConfluxError::LifecycleViolation {
            entity: self.entity.clone(),
            action,
            state: self.state.as_str().to_owned(),
        }
    }

    pub fn begin(&mut self, phase: Phase) -> Result<()> {
        let (from, running, _) = phase.states();
        if self.state != from {
            return Err(self.violation(format!("begin {phase}")));
        }
        self.state = running;
        tracing::debug!(entity = %self.entity, %phase, "phase begun");
        Ok(())
    }

    /// The entity acknowledged `phase`.
    pub fn complete(&mut self, phase: Phase) -> Result<()> {
        self.expect_running(phase)?;
        self.state = phase.states().2;
        tracing::debug!(entity = %self.entity, %phase, "phase done");
        Ok(())
    }

    /// Check that `phase` is running without changing anything.
    pub fn expect_running(&self, phase: Phase) -> Result<()> {
        if self.state != phase.states().1 {
            return Err(self.violation(format!("acknowledge {phase}")));
        }
        Ok(())
    }

    /// Final transition; legal exactly once, after deinit.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state != LifecycleState::Deinitted {
            return Err(self.violation("destroy".to_owned()));
        }
        self.state = LifecycleState::Destroyed;
        tracing::debug!(entity = %self.entity, "destroyed");
        Ok(())
    }

    /// Failure path: jump to `Destroyed` from anywhere. Returns false if the
    /// entity was already destroyed.
    pub fn force_destroy(&mut self) -> bool {
        if self.state == LifecycleState::Destroyed {
            return false;
        }
        tracing::warn!(entity = %self.entity, state = %self.state, "force destroyed");
        self.state = LifecycleState::Destroyed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::ErrorCode;

    #[test]
    fn start_before_init_is_rejected() {
        let mut lc = Lifecycle::new("ext");
        lc.begin(Phase::Configure).unwrap();
        lc.complete(Phase::Configure).unwrap();
        let err = lc.complete(Phase::Start).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LifecycleViolation);
        assert!(lc.begin(Phase::Start).is_err());
        assert_eq!(lc.state(), LifecycleState::Configured);
    }

    #[test]
    fn full_sequence_destroys_once() {
        let mut lc = Lifecycle::new("ext");
        for phase in [Phase::Configure, Phase::Init, Phase::Start, Phase::Stop, Phase::Deinit] {
            lc.begin(phase).unwrap();
            lc.complete(phase).unwrap();
        }
        lc.destroy().unwrap();
        assert_eq!(lc.state(), LifecycleState::Destroyed);
        assert!(lc.destroy().is_err());
        assert!(!lc.force_destroy());
    }

    #[test]
    fn force_destroy_from_middle() {
        let mut lc = Lifecycle::new("ext");
        lc.begin(Phase::Configure).unwrap();
        assert!(lc.force_destroy());
        assert!(lc.begin(Phase::Init).is_err());
    }
}
