//! Channel resolution

use grammers_client::types::peer::Peer;
use grammers_client::Client;
use grammers_tl_types as tl;
use tracing::debug;

use crate::config::ChatEntity;
use crate::error::{Error, Result};
use crate::models::ChannelInfo;

/// A channel the history can be requested from.
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub info: ChannelInfo,
    pub input_peer: tl::enums::InputPeer,
}

/// Resolve a ChatEntity to an actual Peer
pub async fn resolve_chat(client: &Client, entity: &ChatEntity) -> Result<Peer> {
    match entity {
        ChatEntity::Channel(target_id) => {
            // Numeric ids are only resolvable through the user's dialogs
            let mut dialogs = client.iter_dialogs();

            while let Some(dialog) = dialogs
                .next()
                .await
                .map_err(|e| Error::TelegramError(e.to_string()))?
            {
                if channel_id(&dialog.peer) == Some(*target_id) {
                    return Ok(dialog.peer.clone());
                }
            }

            Err(Error::ChannelNotFound(format!(
                "Channel {} not found in dialogs",
                target_id
            )))
        }
        ChatEntity::Username(username) => client
            .resolve_username(username)
            .await
            .map_err(|e| Error::TelegramError(e.to_string()))?
            .ok_or_else(|| Error::ChannelNotFound(format!("Username @{} not found", username))),
    }
}

/// Raw channel id for broadcast channels and megagroups.
fn channel_id(peer: &Peer) -> Option<i64> {
    match peer {
        Peer::Channel(channel) => Some(channel.raw.id),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(c) => Some(c.id),
            _ => None,
        },
        Peer::User(_) => None,
    }
}

fn channel_input_peer(peer: &Peer) -> Result<Option<tl::enums::InputPeer>> {
    let (channel_id, access_hash) = match peer {
        Peer::Channel(channel) => (channel.raw.id, channel.raw.access_hash),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(c) => (c.id, c.access_hash),
            _ => return Ok(None),
        },
        Peer::User(_) => return Ok(None),
    };

    input_channel(channel_id, access_hash).map(Some)
}

/// Min channels arrive without an access hash and cannot be queried.
fn input_channel(channel_id: i64, access_hash: Option<i64>) -> Result<tl::enums::InputPeer> {
    let access_hash = access_hash.ok_or_else(|| {
        Error::ChannelNotFound(format!("Channel {} has no access hash", channel_id))
    })?;

    Ok(tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
        channel_id,
        access_hash,
    }))
}

/// Resolve the configured channel and build the peer `messages.getHistory`
/// needs. Users and basic groups are rejected.
pub async fn resolve_channel(client: &Client, entity: &ChatEntity) -> Result<ResolvedChannel> {
    let peer = resolve_chat(client, entity).await?;

    let (Some(id), Some(input_peer)) = (channel_id(&peer), channel_input_peer(&peer)?) else {
        return Err(Error::ChannelNotFound(format!(
            "{} is not a channel",
            entity.key()
        )));
    };

    let info = ChannelInfo {
        id,
        name: entity.key(),
        title: peer.name().map(|s| s.to_string()),
    };
    debug!(channel_id = id, name = %info.name, "Channel resolved");

    Ok(ResolvedChannel { info, input_peer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_channel_carries_access_hash() {
        let peer = input_channel(42, Some(-7)).unwrap();
        match peer {
            tl::enums::InputPeer::Channel(c) => {
                assert_eq!(c.channel_id, 42);
                assert_eq!(c.access_hash, -7);
            }
            other => panic!("unexpected peer: {:?}", other),
        }
    }

    #[test]
    fn input_channel_without_access_hash_is_not_found() {
        let err = input_channel(42, None).unwrap_err();
        assert!(matches!(err, Error::ChannelNotFound(ref msg) if msg.contains("42")));
    }
}
