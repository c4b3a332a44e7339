// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod channel;

pub use channel::{Ack, SignalChannel, SignalEnvelope};

/// One key/value write handed from a producer to the dispatcher.
///
/// `terminal` marks the last signal the producer population will ever send. The
/// dispatcher starts shutting down once that write has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub key: String,
    pub value: String,
    pub terminal: bool,
}

impl Signal {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Signal {
            key: key.into(),
            value: value.into(),
            terminal: false,
        }
    }

    pub fn terminal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Signal {
            key: key.into(),
            value: value.into(),
            terminal: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("signal channel is closed")]
    ChannelClosed,
}
