use hashbrown::HashMap;

use crate::quant::{ChannelId, Time};

/// Per-channel elapsed time during one scheduling run.
#[derive(Debug, Clone, Default)]
pub struct Cursors {
    positions: HashMap<ChannelId, Time>,
}

impl Cursors {
    /// Every channel starts at zero.
    pub fn new<'a>(channels: impl IntoIterator<Item = &'a ChannelId>) -> Self {
        Self {
            positions: channels.into_iter().map(|c| (c.clone(), Time::ZERO)).collect(),
        }
    }

    /// Latest cursor among `channels`, never earlier than zero.
    pub fn latest<'a>(&self, channels: impl IntoIterator<Item = &'a ChannelId>) -> Time {
        channels
            .into_iter()
            .filter_map(|c| self.positions.get(c).copied())
            .fold(Time::ZERO, Time::max)
    }

    /// Moves every channel in `channels` to `point`.
    pub fn synchronize<'a>(
        &mut self,
        channels: impl IntoIterator<Item = &'a ChannelId>,
        point: Time,
    ) {
        for channel in channels {
            self.positions.insert(channel.clone(), point);
        }
    }

    #[cfg(test)]
    fn get(&self, channel: &str) -> Option<Time> {
        self.positions.get(channel).copied()
    }

    #[must_use]
    pub fn max(&self) -> Time {
        self.positions.values().copied().fold(Time::ZERO, Time::max)
    }
}
