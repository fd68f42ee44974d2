//! Host rules: relay, join handshake, departures, image brokering.

use bytes::Bytes;
use tablesync_protocol::{
    ChannelName, ClientId, Envelope, Payload, ProtocolError, Recipient, SessionInfo, channels,
};

use crate::HostConfig;
use crate::role::{Effects, Rule};
use crate::roster::Roster;

pub(crate) const HOST_RULES: &[(&str, Rule<HostRole>)] = &[
    (channels::ADD_PIECE, forward),
    (channels::DELETE_PIECE, forward),
    (channels::MOVE_PIECE, forward),
    (channels::RESIZE_PIECE, forward),
    (channels::ADD_PAGE, forward),
    (channels::CHAT_MSG, forward),
    (channels::JOIN, join),
    (channels::DISCONNECT, disconnect),
    (channels::LEAVE, leave),
    (channels::IMAGE_REQUEST, image_request),
    (channels::NEW_IMAGE, new_image),
];

#[derive(Debug)]
pub(crate) struct HostRole {
    pub session: SessionInfo,
    pub roster: Roster,
}

impl HostRole {
    pub(crate) fn new(config: &HostConfig) -> Self {
        let mut roster = Roster::default();
        roster.insert(ClientId::HOST, config.host_name.clone());
        Self {
            session: config.session(),
            roster,
        }
    }

    /// Takes a client off the roster and tells everybody else. Does
    /// nothing for ids that aren't on it, so a `LEAVE` followed by the
    /// transport's `DISCONNECT` announces the departure once.
    fn remove_client(&mut self, fx: &mut Effects<'_>, id: ClientId) {
        if id.is_host() {
            tracing::warn!("ignoring departure notice for the host itself");
            return;
        }
        let Some(name) = self.roster.remove(id) else {
            tracing::debug!(client_id = %id, "departure for unknown client");
            return;
        };

        tracing::info!(client_id = %id, %name, "client left");
        fx.images.drop_requester(id);
        fx.outbox.push(
            channels::CLIENT_DELETE,
            Recipient::All,
            &Envelope::new(id.0, ClientId::HOST, Bytes::new()),
        );
    }

    /// Serves an image to `requester`, or records the request and asks
    /// the other clients for it. Also used for the host's own requests.
    pub(crate) fn request_image(
        &mut self,
        fx: &mut Effects<'_>,
        image_id: u64,
        requester: ClientId,
    ) {
        if let Some(data) = fx.images.get(image_id) {
            if !requester.is_host() {
                tracing::debug!(image_id, %requester, "serving cached image");
                fx.outbox.push(
                    channels::NEW_IMAGE,
                    Recipient::Client(requester),
                    &Envelope::new(image_id, ClientId::HOST, data.clone()),
                );
            }
            return;
        }

        tracing::debug!(image_id, %requester, "image not cached, request pending");
        if fx.images.add_pending(image_id, requester) {
            let ask = Bytes::copy_from_slice(&image_id.to_le_bytes());
            fx.outbox.push(
                channels::IMAGE_REQUEST,
                Recipient::AllExcept(requester),
                &Envelope::new(image_id, ClientId::HOST, ask),
            );
        }
    }

    /// Caches an image and forwards it to everybody who was waiting.
    pub(crate) fn store_image(
        &mut self,
        fx: &mut Effects<'_>,
        image_id: u64,
        data: Bytes,
        uploader: ClientId,
    ) {
        for requester in fx.images.store(image_id, data.clone()) {
            if requester.is_host() || requester == uploader {
                continue;
            }
            tracing::debug!(image_id, %requester, "satisfying pending image request");
            fx.outbox.push(
                channels::NEW_IMAGE,
                Recipient::Client(requester),
                &Envelope::new(image_id, ClientId::HOST, data.clone()),
            );
        }
    }
}

/// Relays a change to everyone except the client that made it.
fn forward(
    host: &mut HostRole,
    fx: &mut Effects<'_>,
    channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let origin = envelope.sender_client_id;
    if !host.roster.contains(origin) {
        tracing::warn!(
            %origin,
            %channel,
            "relaying change from a client not on the roster"
        );
    }
    fx.outbox
        .push_raw(channel.clone(), Recipient::AllExcept(origin), envelope.encode());
    Ok(())
}

/// The join handshake.
///
/// 1. Add the newcomer to the roster.
/// 2. Announce it to everybody else with `CLIENT_ADD`.
/// 3. Send it `JOIN_ACCEPT`, then the whole roster (itself and the host
///    included) one `CLIENT_ADD` at a time, addressed to it alone.
fn join(
    host: &mut HostRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let id = ClientId(envelope.entity_id);
    let name = String::decode_payload(envelope.payload)?;
    if id.is_host() {
        return Err(ProtocolError::InvalidMessage(
            "JOIN for the reserved host id".to_string(),
        ));
    }

    host.roster.insert(id, name.clone());
    tracing::info!(
        client_id = %id,
        %name,
        roster_len = host.roster.len(),
        "client added to roster"
    );

    fx.outbox.push(
        channels::CLIENT_ADD,
        Recipient::AllExcept(id),
        &Envelope::new(id.0, ClientId::HOST, Bytes::from(name)),
    );
    fx.outbox.push(
        channels::JOIN_ACCEPT,
        Recipient::Client(id),
        &Envelope::new(
            host.session.session_id,
            ClientId::HOST,
            Bytes::from(host.session.session_name.clone()),
        ),
    );
    for entry in host.roster.list() {
        fx.outbox.push(
            channels::CLIENT_ADD,
            Recipient::Client(id),
            &Envelope::new(entry.client_id.0, ClientId::HOST, Bytes::from(entry.name)),
        );
    }
    Ok(())
}

fn disconnect(
    host: &mut HostRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    host.remove_client(fx, ClientId(envelope.entity_id));
    Ok(())
}

fn leave(
    host: &mut HostRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let id = envelope.sender_client_id;
    if envelope.entity_id != id.0 {
        return Err(ProtocolError::InvalidMessage(format!(
            "{id} sent LEAVE for client {}",
            envelope.entity_id
        )));
    }
    host.remove_client(fx, id);
    fx.kicks.push(id);
    Ok(())
}

fn image_request(
    host: &mut HostRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let image_id = u64::decode_payload(envelope.payload)?;
    host.request_image(fx, image_id, envelope.sender_client_id);
    Ok(())
}

fn new_image(
    host: &mut HostRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    tracing::debug!(
        image_id = envelope.entity_id,
        uploader = %envelope.sender_client_id,
        len = envelope.payload.len(),
        "image received"
    );
    host.store_image(
        fx,
        envelope.entity_id,
        envelope.payload,
        envelope.sender_client_id,
    );
    Ok(())
}
