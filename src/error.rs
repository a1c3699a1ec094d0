use snafu::Snafu;

use crate::redrive::RunStatistics;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Queue not found: {name}"))]
    QueueNotFound { name: String },

    #[snafu(display("Failed to resolve queue {name}: {source}"))]
    Resolution {
        name: String,
        #[snafu(source(false))]
        source: eyre::Report,
    },

    #[snafu(display("Failed to receive messages from {endpoint}: {source}"))]
    Receive {
        endpoint: String,
        #[snafu(source(false))]
        source: eyre::Report,
        /// Statistics gathered before the drain call failed.
        statistics: Box<RunStatistics>,
    },

    #[snafu(display("Failed to invoke {target}: {source}"))]
    Invocation {
        target: String,
        #[snafu(source(false))]
        source: eyre::Report,
    },

    #[snafu(display("Failed to delete message {message_id}: {source}"))]
    Acknowledge {
        message_id: String,
        #[snafu(source(false))]
        source: eyre::Report,
    },

    #[snafu(display("Function {function} is being modified by another operation: {message}"))]
    Conflict { function: String, message: String },

    #[snafu(display("Failed to access configuration of {function}: {source}"))]
    Configuration {
        function: String,
        #[snafu(source(false))]
        source: eyre::Report,
    },

    #[snafu(display("Invalid parameter: {message}"))]
    InvalidParameter { message: String },
}

impl Error {
    pub fn queue_not_found(name: impl Into<String>) -> Self {
        Self::QueueNotFound { name: name.into() }
    }

    pub fn resolution(name: impl Into<String>, source: impl Into<eyre::Report>) -> Self {
        Self::Resolution {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn receive(endpoint: impl Into<String>, source: impl Into<eyre::Report>) -> Self {
        Self::Receive {
            endpoint: endpoint.into(),
            source: source.into(),
            statistics: Box::default(),
        }
    }

    pub fn invocation(target: impl Into<String>, source: impl Into<eyre::Report>) -> Self {
        Self::Invocation {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn acknowledge(message_id: impl Into<String>, source: impl Into<eyre::Report>) -> Self {
        Self::Acknowledge {
            message_id: message_id.into(),
            source: source.into(),
        }
    }

    pub fn conflict(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn configuration(function: impl Into<String>, source: impl Into<eyre::Report>) -> Self {
        Self::Configuration {
            function: function.into(),
            source: source.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// True for the concurrent-modification error that the conflict-retry path recovers from.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Attaches the statistics of the interrupted run to a receive failure.
    pub(crate) fn with_statistics(self, stats: RunStatistics) -> Self {
        match self {
            Self::Receive {
                endpoint, source, ..
            } => Self::Receive {
                endpoint,
                source,
                statistics: Box::new(stats),
            },
            other => other,
        }
    }
}
