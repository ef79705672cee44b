use std::fmt;

/// Connection state of the sync agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started yet
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Transport open, mirror being kept in sync
    Connected,
    /// Waiting for the retry interval before reopening
    Reconnecting,
    /// Retry budget exhausted; the agent has stopped for good
    Terminated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// How many times a lost or failed connection is reopened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Unlimited,
    Limited(u32),
}

impl RetryBudget {
    /// Negative values mean unlimited, 0 means never retry
    pub fn from_max_retries(max_retries: i64) -> Self {
        if max_retries < 0 {
            RetryBudget::Unlimited
        } else {
            RetryBudget::Limited(u32::try_from(max_retries).unwrap_or(u32::MAX))
        }
    }

    fn allows(self, retries: u32) -> bool {
        match self {
            RetryBudget::Unlimited => true,
            RetryBudget::Limited(max) => retries < max,
        }
    }
}

/// Connection lifecycle without any I/O; the agent drives it and acts on
/// the resulting states.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    retries: u32,
    budget: RetryBudget,
}

impl Lifecycle {
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retries: 0,
            budget,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Disconnected -> Connecting
    pub fn start(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connecting;
        }
        self.state
    }

    /// Connecting -> Connected; the retry counter starts over
    pub fn connected(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            self.retries = 0;
        }
        self.state
    }

    /// The transport failed to open or closed. Moves to Reconnecting while
    /// the budget allows another attempt, otherwise to Terminated.
    pub fn connection_lost(&mut self) -> ConnectionState {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return self.state;
        }
        if self.budget.allows(self.retries) {
            self.retries = self.retries.saturating_add(1);
            self.state = ConnectionState::Reconnecting;
        } else {
            self.state = ConnectionState::Terminated;
        }
        self.state
    }

    /// Reconnecting -> Connecting, when the retry delay has elapsed
    pub fn reopen(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
        }
        self.state
    }
}
