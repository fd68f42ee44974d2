//! Client rules: session, roster view, image cache.

use tablesync_protocol::{
    ChannelName, ClientId, Envelope, Payload, ProtocolError, Recipient, SessionInfo, channels,
};

use crate::role::{Effects, Rule};
use crate::roster::Roster;

pub(crate) const CLIENT_RULES: &[(&str, Rule<ClientRole>)] = &[
    (channels::JOIN_ACCEPT, join_accept),
    (channels::CLIENT_ADD, client_add),
    (channels::CLIENT_DELETE, client_delete),
    (channels::IMAGE_REQUEST, image_request),
    (channels::NEW_IMAGE, new_image),
    (channels::DISCONNECT, host_lost),
];

#[derive(Debug, Default)]
pub(crate) struct ClientRole {
    pub session: Option<SessionInfo>,
    pub roster: Roster,
    pub joined: bool,
}

fn join_accept(
    client: &mut ClientRole,
    _fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let session = SessionInfo {
        session_id: envelope.entity_id,
        session_name: String::decode_payload(envelope.payload)?,
    };
    tracing::info!(
        session_id = session.session_id,
        session_name = %session.session_name,
        "joined session"
    );
    client.session = Some(session);
    client.joined = true;
    Ok(())
}

fn client_add(
    client: &mut ClientRole,
    _fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let id = ClientId(envelope.entity_id);
    let name = String::decode_payload(envelope.payload)?;
    tracing::debug!(client_id = %id, %name, "roster add");
    client.roster.insert(id, name);
    Ok(())
}

fn client_delete(
    client: &mut ClientRole,
    _fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let id = ClientId(envelope.entity_id);
    if client.roster.remove(id).is_some() {
        tracing::debug!(client_id = %id, "roster delete");
    }
    Ok(())
}

/// Any peer holding an image can serve it.
fn image_request(
    _client: &mut ClientRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    let image_id = u64::decode_payload(envelope.payload)?;
    if let Some(data) = fx.images.get(image_id) {
        tracing::debug!(image_id, "answering image request from cache");
        fx.outbox.push(
            channels::NEW_IMAGE,
            Recipient::Client(ClientId::HOST),
            &Envelope::new(image_id, fx.local_id, data.clone()),
        );
    }
    Ok(())
}

fn new_image(
    _client: &mut ClientRole,
    fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    tracing::debug!(image_id = envelope.entity_id, len = envelope.payload.len(), "image cached");
    fx.images.store(envelope.entity_id, envelope.payload);
    Ok(())
}

/// `DISCONNECT` on a client only ever means the host went away.
fn host_lost(
    client: &mut ClientRole,
    _fx: &mut Effects<'_>,
    _channel: &ChannelName,
    envelope: Envelope,
) -> Result<(), ProtocolError> {
    if envelope.entity_id != 0 {
        tracing::debug!(client_id = envelope.entity_id, "ignoring peer disconnect notice");
        return Ok(());
    }
    tracing::warn!("lost connection to host");
    client.roster.clear();
    client.joined = false;
    Ok(())
}
