use std::collections::BTreeSet;

use log::warn;

use crate::config::ChannelSwitches;
use crate::models::{Channel, Dataset};

/// Which channels take part in the current dataset run.
///
/// Activation happens once, at construction. After that a channel can only
/// be deactivated, so `is_active` never goes from false back to true.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    active: BTreeSet<Channel>,
}

impl ChannelRegistry {
    /// A channel starts active when it is globally enabled and the dataset requests it
    pub fn new(switches: &ChannelSwitches, dataset: &Dataset) -> Self {
        let active = Channel::ALL
            .iter()
            .copied()
            .filter(|c| switches.enabled(*c) && dataset.requests(*c))
            .collect();
        Self { active }
    }

    pub fn is_active(&self, channel: Channel) -> bool {
        self.active.contains(&channel)
    }

    /// Drop a channel for the rest of the run; returns false if it was already inactive
    pub fn deactivate(&mut self, channel: Channel, reason: &str) -> bool {
        let removed = self.active.remove(&channel);
        if removed {
            warn!("Channel {} deactivated: {}", channel, reason);
        }
        removed
    }

    /// Active channels in processing order
    pub fn active(&self) -> Vec<Channel> {
        self.active.iter().copied().collect()
    }

    pub fn any_active(&self) -> bool {
        !self.active.is_empty()
    }
}
