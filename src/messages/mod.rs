//! # Message Codec Layer
//!
//! Pure decoders turning response payloads into read-only records.
//!
//! Every decoder checks a type-specific minimum length before reading and
//! never reads past the end of the payload. Malformed input yields a
//! [`DecodeError`]; [`decode_payload`] logs it and yields no record, so a bad
//! payload never terminates the session that received it.
//!
//! ## Components
//! - **Reader**: cursor with the shared field conventions
//! - **Account**: account info, balances, last reference, public keys
//! - **Blocks**: block summaries and height announcements
//! - **Peers**: peer address lists
//! - **Names**, **Groups**, **Chat**, **Transactions**: domain records

pub mod account;
pub mod blocks;
pub mod chat;
pub mod groups;
pub mod names;
pub mod peers;
pub mod reader;
pub mod transactions;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::message_type::MessageType;
use crate::error::DecodeError;

pub use account::{Account, AccountBalance, PublicKeyRecord};
pub use blocks::{BlockSummary, ChainTip};
pub use chat::{ActiveChats, ChatMessage, DirectChat, GroupChat};
pub use groups::{Group, GroupBan, GroupInvite, GroupJoinRequest, GroupMember, GroupMembers};
pub use names::NameRecord;
pub use reader::{Amount, PayloadReader};
pub use transactions::{Poll, ProcessTransactionResponse};

/// A decoded unsolicited or response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DecodedMessage {
    Account(Account),
    AccountBalance(AccountBalance),
    BlockSummaries(Vec<BlockSummary>),
    Height(ChainTip),
    Peers(Vec<String>),
    Names(Vec<NameRecord>),
    PrimaryName(Option<String>),
    Groups(Vec<Group>),
    GroupMembers(GroupMembers),
    GroupBans(Vec<GroupBan>),
    GroupInvites(Vec<GroupInvite>),
    GroupJoinRequests(Vec<GroupJoinRequest>),
    LastReference(Option<String>),
    UnitFee(Amount),
    ProcessTransactionResponse(ProcessTransactionResponse),
    PublicKey(PublicKeyRecord),
    ActiveChat(ActiveChats),
    ChatMessages(Vec<ChatMessage>),
    Polls(Vec<Poll>),
}

/// Decode `payload` according to `message_type`.
///
/// Returns `Ok(None)` for types that carry no decodable record.
pub fn try_decode_payload(
    message_type: MessageType,
    payload: &[u8],
) -> Result<Option<DecodedMessage>, DecodeError> {
    use DecodedMessage as D;
    use MessageType as T;

    let decoded = match message_type {
        T::ACCOUNT => D::Account(account::decode_account(payload)?),
        T::ACCOUNT_BALANCE => D::AccountBalance(account::decode_account_balance(payload)?),
        T::BLOCK_SUMMARIES_V2 => D::BlockSummaries(blocks::decode_block_summaries_v2(payload)?),
        T::HEIGHT_V2 => D::Height(blocks::decode_height_v2(payload)?),
        T::PEERS_V2 => D::Peers(peers::decode_peers_v2(payload)?),
        T::NAMES => D::Names(names::decode_names(payload)?),
        T::PRIMARY_NAME => D::PrimaryName(names::decode_primary_name(payload)?),
        T::GROUPS => D::Groups(groups::decode_groups(payload, false)?),
        T::GROUP_MEMBERS => D::GroupMembers(groups::decode_group_members(payload)?),
        T::GROUP_BANS => D::GroupBans(groups::decode_group_bans(payload)?),
        T::GROUP_INVITES => D::GroupInvites(groups::decode_group_invites(payload)?),
        T::GROUP_JOIN_REQUESTS => D::GroupJoinRequests(groups::decode_group_join_requests(payload)?),
        T::LAST_REFERENCE => D::LastReference(account::decode_last_reference(payload)?),
        T::UNIT_FEE => D::UnitFee(transactions::decode_unit_fee(payload)?),
        T::PROCESS_TRANSACTION_RESPONSE => D::ProcessTransactionResponse(
            transactions::decode_process_transaction_response(payload)?,
        ),
        T::PUBLIC_KEY => D::PublicKey(account::decode_public_key(payload)?),
        T::ACTIVE_CHAT => D::ActiveChat(chat::decode_active_chat(payload)?),
        T::CHAT_MESSAGES => D::ChatMessages(chat::decode_chat_messages(payload)?),
        T::POLLS => D::Polls(transactions::decode_polls(payload)?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Decode `payload`, logging and dropping anything malformed.
pub fn decode_payload(message_type: MessageType, payload: &[u8]) -> Option<DecodedMessage> {
    match try_decode_payload(message_type, payload) {
        Ok(Some(decoded)) => Some(decoded),
        Ok(None) => {
            debug!(%message_type, "No decoder for message type");
            None
        }
        Err(e) => {
            warn!(%message_type, len = payload.len(), error = %e, "Discarding malformed payload");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_short_payloads_yield_no_record() {
        let cases = [
            (MessageType::ACCOUNT, 144),
            (MessageType::ACCOUNT_BALANCE, 40),
            (MessageType::HEIGHT_V2, 107),
            (MessageType::PEERS_V2, 3),
            (MessageType::NAMES, 3),
            (MessageType::GROUP_MEMBERS, 11),
            (MessageType::UNIT_FEE, 7),
            (MessageType::PUBLIC_KEY, 28),
            (MessageType::ACTIVE_CHAT, 7),
            (MessageType::PROCESS_TRANSACTION_RESPONSE, 11),
        ];
        for (message_type, len) in cases {
            assert_eq!(decode_payload(message_type, &vec![0u8; len]), None, "{message_type}");
        }
    }

    #[test]
    fn test_dispatches_by_type() {
        let mut p = 1i32.to_be_bytes().to_vec();
        p.extend(names::tests::name_bytes("Alice", false));
        match decode_payload(MessageType::NAMES, &p) {
            Some(DecodedMessage::Names(records)) => assert_eq!(records[0].name, "Alice"),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_request_types_have_no_decoder() {
        assert_eq!(try_decode_payload(MessageType::GET_ACCOUNT, &[0; 25]), Ok(None));
    }
}
