use std::fmt;

/// Stage of the single live voice turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Recording,
    Transcribing,
    Thinking,
    Speaking,
    Failed,
}

impl PipelineState {
    pub fn is_idle(self) -> bool {
        self == PipelineState::Idle
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Recording => "recording",
            PipelineState::Transcribing => "transcribing",
            PipelineState::Thinking => "thinking",
            PipelineState::Speaking => "speaking",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Completed exchanges since the last reset, against a fixed budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnCounter {
    used: u32,
    budget: u32,
}

impl TurnCounter {
    pub fn new(budget: u32) -> Self {
        Self { used: 0, budget }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.used)
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.budget
    }

    pub fn record(&mut self) {
        self.used = self.used.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}
