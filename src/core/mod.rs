mod dispatcher;
mod flow;
mod manager;
mod processor;
mod puller;
mod subscriber;
mod subscription;

pub(crate) use dispatcher::*;
pub(crate) use flow::*;
pub use manager::*;
pub(crate) use processor::*;
pub(crate) use puller::*;
pub(crate) use subscriber::*;
pub use subscription::*;

use crate::broker::PulledMessage;

#[cfg(test)]
mod flow_test;
#[cfg(test)]
mod subscriber_test;
#[cfg(test)]
mod subscription_test;

/// One item handed from the pull loop to the process loop.
pub(crate) enum QueueItem {
    Message(PulledMessage),
    /// Pushed on disconnect to unblock a process loop waiting on an
    /// empty queue
    Shutdown,
}
