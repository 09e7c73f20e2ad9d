//! Typed requests: build a GET_* payload, await the reply, decode it.
//!
//! Each helper is one [`Session::send_request`] plus one decoder. Malformed
//! replies surface as `ProtocolError::Decode` to the caller and leave the
//! session running.

use bytes::Bytes;
use tracing::warn;

use super::session::Session;
use crate::core::message_type::MessageType;
use crate::core::payloads::{self, Encoding};
use crate::error::{DecodeError, Result};
use crate::messages::{
    account, chat, groups, names, transactions, Account, AccountBalance, ActiveChats, Amount,
    ChatMessage, Group, GroupBan, GroupInvite, GroupJoinRequest, GroupMembers, NameRecord, Poll,
    ProcessTransactionResponse, PublicKeyRecord,
};

/// Paging parameters shared by list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: u32,
    pub offset: u32,
    pub reverse: bool,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            reverse: false,
        }
    }
}

impl Session {
    async fn query<T>(
        &self,
        request: MessageType,
        payload: Bytes,
        decode: impl FnOnce(&[u8]) -> std::result::Result<T, DecodeError>,
    ) -> Result<T> {
        let response = self.send_request(request, payload, None).await?;
        decode(&response).map_err(|e| {
            self.metrics().decode_error();
            warn!(peer = %self.key(), %request, error = %e, "Malformed reply");
            e.into()
        })
    }

    pub async fn account(&self, address: &str) -> Result<Account> {
        let payload = payloads::get_account(address)?;
        self.query(MessageType::GET_ACCOUNT, payload, account::decode_account)
            .await
    }

    pub async fn account_balance(&self, address: &str, asset_id: u64) -> Result<AccountBalance> {
        let payload = payloads::get_account_balance(address, asset_id)?;
        self.query(
            MessageType::GET_ACCOUNT_BALANCE,
            payload,
            account::decode_account_balance,
        )
        .await
    }

    /// Names registered to `address`
    pub async fn names_by_owner(&self, address: &str) -> Result<Vec<NameRecord>> {
        let payload = payloads::get_account_names(address)?;
        self.query(MessageType::GET_ACCOUNT_NAMES, payload, names::decode_names)
            .await
    }

    pub async fn name_info(&self, name: &str) -> Result<Option<NameRecord>> {
        let records = self
            .query(MessageType::GET_NAME, payloads::get_name(name), names::decode_names)
            .await?;
        Ok(records.into_iter().next())
    }

    /// Registered names, optionally only those updated after `after` (ms)
    pub async fn all_names(&self, paging: Paging, after: Option<i64>) -> Result<Vec<NameRecord>> {
        let payload = payloads::get_names(paging.limit, paging.offset, paging.reverse, after);
        self.query(MessageType::GET_NAMES, payload, names::decode_names)
            .await
    }

    pub async fn primary_name(&self, address: &str) -> Result<Option<String>> {
        let payload = payloads::get_primary_name(address)?;
        self.query(MessageType::GET_PRIMARY_NAME, payload, names::decode_primary_name)
            .await
    }

    pub async fn groups(&self, paging: Paging) -> Result<Vec<Group>> {
        let payload = payloads::get_groups(paging.limit, paging.offset, paging.reverse);
        self.query(MessageType::GET_GROUPS, payload, |p| groups::decode_groups(p, false))
            .await
    }

    pub async fn group(&self, group_id: i32) -> Result<Option<Group>> {
        let records = self
            .query(MessageType::GET_GROUP, payloads::get_group(group_id), |p| {
                groups::decode_groups(p, false)
            })
            .await?;
        Ok(records.into_iter().next())
    }

    /// Groups `address` belongs to, with member count and admin flag
    pub async fn account_groups(&self, address: &str) -> Result<Vec<Group>> {
        let payload = payloads::get_account_groups(address)?;
        self.query(MessageType::GET_ACCOUNT_GROUPS, payload, |p| {
            groups::decode_groups(p, true)
        })
        .await
    }

    pub async fn owner_groups(&self, address: &str) -> Result<Vec<Group>> {
        let payload = payloads::get_owner_groups(address)?;
        self.query(MessageType::GET_OWNER_GROUPS, payload, |p| {
            groups::decode_groups(p, false)
        })
        .await
    }

    pub async fn group_members(
        &self,
        group_id: i32,
        only_admins: bool,
        paging: Paging,
    ) -> Result<GroupMembers> {
        let payload = payloads::get_group_members(
            group_id,
            only_admins,
            paging.limit,
            paging.offset,
            paging.reverse,
        );
        self.query(
            MessageType::GET_GROUP_MEMBERS,
            payload,
            groups::decode_group_members,
        )
        .await
    }

    pub async fn group_bans(&self, group_id: i32) -> Result<Vec<GroupBan>> {
        self.query(
            MessageType::GET_GROUP_BANS,
            payloads::get_group_bans(group_id),
            groups::decode_group_bans,
        )
        .await
    }

    /// Pending invites addressed to `address`
    pub async fn address_group_invites(&self, address: &str) -> Result<Vec<GroupInvite>> {
        let payload = payloads::get_address_group_invites(address)?;
        self.query(
            MessageType::GET_ADDRESS_GROUP_INVITES,
            payload,
            groups::decode_group_invites,
        )
        .await
    }

    pub async fn group_invites(&self, group_id: i32) -> Result<Vec<GroupInvite>> {
        self.query(
            MessageType::GET_GROUP_INVITES,
            payloads::get_group_invites(group_id),
            groups::decode_group_invites,
        )
        .await
    }

    pub async fn group_join_requests(&self, group_id: i32) -> Result<Vec<GroupJoinRequest>> {
        self.query(
            MessageType::GET_GROUP_JOIN_REQUESTS,
            payloads::get_group_join_requests(group_id),
            groups::decode_group_join_requests,
        )
        .await
    }

    /// Signature of the last transaction sent from `address`, if any
    pub async fn last_reference(&self, address: &str) -> Result<Option<String>> {
        let payload = payloads::get_last_reference(address)?;
        self.query(
            MessageType::GET_LAST_REFERENCE,
            payload,
            account::decode_last_reference,
        )
        .await
    }

    /// Fee for one unit of `tx_type`, at `timestamp` if given
    pub async fn unit_fee(&self, tx_type: &str, timestamp: Option<i64>) -> Result<Amount> {
        self.query(
            MessageType::GET_UNIT_FEE,
            payloads::get_unit_fee(tx_type, timestamp),
            transactions::decode_unit_fee,
        )
        .await
    }

    /// Submit a signed, Base58-encoded transaction
    pub async fn process_transaction(&self, signed_base58: &str) -> Result<ProcessTransactionResponse> {
        let payload = payloads::process_transaction(signed_base58)?;
        self.query(
            MessageType::PROCESS_TRANSACTION,
            payload,
            transactions::decode_process_transaction_response,
        )
        .await
    }

    pub async fn public_key(&self, address: &str) -> Result<PublicKeyRecord> {
        let payload = payloads::get_public_key(address)?;
        self.query(MessageType::GET_PUBLIC_KEY, payload, account::decode_public_key)
            .await
    }

    pub async fn active_chat(
        &self,
        address: &str,
        encoding: Encoding,
        has_chat_reference: bool,
    ) -> Result<ActiveChats> {
        let payload = payloads::get_active_chat(address, encoding, has_chat_reference)?;
        self.query(MessageType::GET_ACTIVE_CHAT, payload, chat::decode_active_chat)
            .await
    }

    /// Messages of a group conversation (`tx_group_id`) or between two addresses
    pub async fn chat_messages(
        &self,
        tx_group_id: Option<i32>,
        involving: Option<(&str, &str)>,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        let payload = payloads::get_chat_messages(tx_group_id, involving, before, limit)?;
        self.query(
            MessageType::GET_CHAT_MESSAGES,
            payload,
            chat::decode_chat_messages,
        )
        .await
    }

    pub async fn poll(&self, poll_name: &str) -> Result<Option<Poll>> {
        let polls = self
            .query(
                MessageType::GET_POLL,
                payloads::get_poll(poll_name),
                transactions::decode_polls,
            )
            .await?;
        Ok(polls.into_iter().next())
    }
}
