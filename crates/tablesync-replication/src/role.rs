//! The two endpoint roles and their built-in rules.
//!
//! Host and client share the update loop but little state, so a role is
//! a tagged variant rather than a trait object. Each role has a static
//! table of `(channel, rule)` pairs; the endpoint subscribes one mailbox
//! per table entry and hands every item it drains to the matching rule.

use std::fmt;

use tablesync_protocol::{ChannelName, ClientId, ClientInfo, Envelope, ProtocolError, SessionInfo};

use crate::client::{CLIENT_RULES, ClientRole};
use crate::host::{HOST_RULES, HostRole};
use crate::images::ImageCache;
use crate::outbox::Outbox;

/// Which side of the session an endpoint is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Host,
    Client,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Host => f.write_str("host"),
            RoleKind::Client => f.write_str("client"),
        }
    }
}

/// What a rule may touch besides its own role state.
pub(crate) struct Effects<'a> {
    pub local_id: ClientId,
    pub images: &'a mut ImageCache,
    pub outbox: &'a mut Outbox,
    /// Peers to drop once this tick's outbox has been flushed.
    pub kicks: &'a mut Vec<ClientId>,
}

/// A built-in rule for one channel.
pub(crate) type Rule<R> =
    fn(&mut R, &mut Effects<'_>, &ChannelName, Envelope) -> Result<(), ProtocolError>;

pub(crate) enum Role {
    Host(HostRole),
    Client(ClientRole),
}

impl Role {
    pub(crate) fn kind(&self) -> RoleKind {
        match self {
            Role::Host(_) => RoleKind::Host,
            Role::Client(_) => RoleKind::Client,
        }
    }

    /// Channels this role has built-in rules for.
    pub(crate) fn rule_channels(&self) -> Vec<&'static str> {
        match self {
            Role::Host(_) => HOST_RULES.iter().map(|(channel, _)| *channel).collect(),
            Role::Client(_) => CLIENT_RULES.iter().map(|(channel, _)| *channel).collect(),
        }
    }

    /// Runs the rule registered for `channel` on one inbound envelope.
    pub(crate) fn apply(
        &mut self,
        fx: &mut Effects<'_>,
        channel: &ChannelName,
        envelope: Envelope,
    ) -> Result<(), ProtocolError> {
        match self {
            Role::Host(host) => match lookup(HOST_RULES, channel) {
                Some(rule) => rule(host, fx, channel, envelope),
                None => Ok(()),
            },
            Role::Client(client) => match lookup(CLIENT_RULES, channel) {
                Some(rule) => rule(client, fx, channel, envelope),
                None => Ok(()),
            },
        }
    }

    pub(crate) fn roster(&self) -> Vec<ClientInfo> {
        match self {
            Role::Host(host) => host.roster.list(),
            Role::Client(client) => client.roster.list(),
        }
    }

    pub(crate) fn session(&self) -> Option<&SessionInfo> {
        match self {
            Role::Host(host) => Some(&host.session),
            Role::Client(client) => client.session.as_ref(),
        }
    }
}

fn lookup<R>(table: &[(&'static str, Rule<R>)], channel: &ChannelName) -> Option<Rule<R>> {
    table
        .iter()
        .find(|(name, _)| *name == channel.as_str())
        .map(|(_, rule)| *rule)
}
