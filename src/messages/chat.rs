use serde::Serialize;

use super::reader::{
    require_min, PayloadReader, ADDRESS_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
use crate::error::DecodeError;

const GROUP_CHAT_MIN_LEN: usize = 4 + 4 + 8 + 4 + 4 + 4;
const DIRECT_CHAT_MIN_LEN: usize = ADDRESS_LENGTH + 4 + 8 + 4 + 4;
const CHAT_MESSAGE_MIN_LEN: usize =
    8 + 4 + SIGNATURE_LENGTH + PUBLIC_KEY_LENGTH + ADDRESS_LENGTH + 4 * 7 + SIGNATURE_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChat {
    pub group_id: i32,
    pub group_name: Option<String>,
    pub timestamp: Option<i64>,
    pub sender: Option<String>,
    pub sender_name: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectChat {
    pub address: String,
    pub name: Option<String>,
    pub timestamp: Option<i64>,
    pub sender: Option<String>,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChats {
    pub groups: Vec<GroupChat>,
    pub direct: Vec<DirectChat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub timestamp: i64,
    pub tx_group_id: i32,
    pub reference: String,
    pub sender_public_key: String,
    pub sender: String,
    pub sender_name: Option<String>,
    pub recipient: Option<String>,
    pub recipient_name: Option<String>,
    pub chat_reference: Option<String>,
    pub data: Option<String>,
    pub is_text: bool,
    pub is_encrypted: bool,
    pub signature: String,
}

/// ACTIVE_CHAT: group conversations followed by direct conversations.
pub fn decode_active_chat(payload: &[u8]) -> Result<ActiveChats, DecodeError> {
    require_min("ACTIVE_CHAT", payload, 8)?;
    let mut r = PayloadReader::new(payload);

    let groups = r.read_list(GROUP_CHAT_MIN_LEN, |r| {
        Ok(GroupChat {
            group_id: r.read_i32()?,
            group_name: r.read_nullable_string()?,
            timestamp: r.read_optional_timestamp()?,
            sender: r.read_nullable_base58()?,
            sender_name: r.read_nullable_string()?,
            signature: r.read_nullable_base58()?,
        })
    })?;

    let direct = r.read_list(DIRECT_CHAT_MIN_LEN, |r| {
        Ok(DirectChat {
            address: r.read_address()?,
            name: r.read_nullable_string()?,
            timestamp: r.read_optional_timestamp()?,
            sender: r.read_nullable_base58()?,
            sender_name: r.read_nullable_string()?,
        })
    })?;

    Ok(ActiveChats { groups, direct })
}

fn read_chat_message(r: &mut PayloadReader<'_>) -> Result<ChatMessage, DecodeError> {
    Ok(ChatMessage {
        timestamp: r.read_i64()?,
        tx_group_id: r.read_i32()?,
        reference: r.read_signature()?,
        sender_public_key: r.read_public_key()?,
        sender: r.read_address()?,
        sender_name: r.read_nullable_string()?,
        recipient: r.read_nullable_base58()?,
        recipient_name: r.read_nullable_string()?,
        chat_reference: r.read_nullable_base58()?,
        data: r.read_nullable_base58()?,
        is_text: r.read_flag_or_false()?,
        is_encrypted: r.read_flag_or_false()?,
        signature: r.read_signature()?,
    })
}

pub fn decode_chat_messages(payload: &[u8]) -> Result<Vec<ChatMessage>, DecodeError> {
    require_min("CHAT_MESSAGES", payload, 4)?;
    PayloadReader::new(payload).read_list(CHAT_MESSAGE_MIN_LEN, read_chat_message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn nullable(p: &mut Vec<u8>, v: Option<&[u8]>) {
        match v {
            Some(bytes) => {
                p.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                p.extend_from_slice(bytes);
            }
            None => p.extend_from_slice(&0u32.to_be_bytes()),
        }
    }

    #[test]
    fn test_decode_active_chat() {
        let mut p = 1i32.to_be_bytes().to_vec();
        p.extend_from_slice(&0i32.to_be_bytes());
        nullable(&mut p, Some(b"General"));
        p.extend_from_slice(&1_700_000_000_000i64.to_be_bytes());
        nullable(&mut p, Some(&[0x3A; ADDRESS_LENGTH]));
        nullable(&mut p, None);
        nullable(&mut p, None);

        p.extend_from_slice(&1i32.to_be_bytes());
        p.extend_from_slice(&[0x3B; ADDRESS_LENGTH]);
        nullable(&mut p, Some(b"bob"));
        p.extend_from_slice(&0i64.to_be_bytes());
        nullable(&mut p, None);
        nullable(&mut p, None);

        let chats = decode_active_chat(&p).unwrap();
        assert_eq!(chats.groups.len(), 1);
        assert_eq!(chats.groups[0].group_name.as_deref(), Some("General"));
        assert_eq!(
            chats.groups[0].sender,
            Some(bs58::encode([0x3A; ADDRESS_LENGTH]).into_string())
        );
        assert_eq!(chats.direct[0].name.as_deref(), Some("bob"));
        assert_eq!(chats.direct[0].timestamp, None);
    }

    #[test]
    fn test_decode_chat_messages() {
        let mut p = 1i32.to_be_bytes().to_vec();
        p.extend_from_slice(&1_700_000_000_000i64.to_be_bytes());
        p.extend_from_slice(&0i32.to_be_bytes());
        p.extend_from_slice(&[0x01; SIGNATURE_LENGTH]);
        p.extend_from_slice(&[0x02; PUBLIC_KEY_LENGTH]);
        p.extend_from_slice(&[0x3A; ADDRESS_LENGTH]);
        nullable(&mut p, Some(b"alice"));
        nullable(&mut p, None);
        nullable(&mut p, None);
        nullable(&mut p, None);
        nullable(&mut p, Some(b"hello"));
        p.extend_from_slice(&2u32.to_be_bytes());
        p.extend_from_slice(&1u32.to_be_bytes());
        p.extend_from_slice(&[0x03; SIGNATURE_LENGTH]);

        let messages = decode_chat_messages(&p).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_name.as_deref(), Some("alice"));
        assert_eq!(messages[0].recipient, None);
        assert!(messages[0].is_text);
        assert!(!messages[0].is_encrypted);
        assert_eq!(
            messages[0].data,
            Some(bs58::encode(b"hello").into_string())
        );
    }

    #[test]
    fn test_short_chat_payloads() {
        assert!(decode_active_chat(&[0; 4]).is_err());
        assert!(decode_chat_messages(&1i32.to_be_bytes()).is_err());
    }
}
