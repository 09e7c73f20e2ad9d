//! Group records: groups, members, bans, invites and join requests.

use serde::Serialize;

use super::reader::{require_min, PayloadReader, ADDRESS_LENGTH, SIGNATURE_LENGTH};
use crate::error::DecodeError;

const GROUP_MIN_LEN: usize =
    4 + ADDRESS_LENGTH + 4 + 4 + 8 + 8 + 4 + 4 + 4 + 4 + SIGNATURE_LENGTH + 4 + 4;
const MEMBER_INFO_LEN: usize = 4 + 4;
const MEMBER_MIN_LEN: usize = ADDRESS_LENGTH + 8 + 4;
const BAN_MIN_LEN: usize = 4 + ADDRESS_LENGTH + ADDRESS_LENGTH + 8 + 4 + 8 + SIGNATURE_LENGTH;
const INVITE_MIN_LEN: usize = 4 + ADDRESS_LENGTH + ADDRESS_LENGTH + 8 + 4;
const JOIN_REQUEST_MIN_LEN: usize = 4 + ADDRESS_LENGTH + 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: i32,
    pub owner: String,
    pub group_name: String,
    pub description: Option<String>,
    pub created: i64,
    pub updated: Option<i64>,
    pub is_open: bool,
    pub approval_threshold: i32,
    pub min_block_delay: i32,
    pub max_block_delay: i32,
    pub reference: String,
    pub creation_group_id: i32,
    pub reduced_group_name: String,
    /// Only carried by account-groups responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub member: String,
    pub joined: Option<i64>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembers {
    pub member_count: i32,
    pub admin_count: i32,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBan {
    pub group_id: i32,
    pub offender: String,
    pub admin: String,
    pub banned: i64,
    pub reason: Option<String>,
    pub expiry: Option<i64>,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInvite {
    pub group_id: i32,
    pub inviter: String,
    pub invitee: String,
    pub expiry: Option<i64>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJoinRequest {
    pub group_id: i32,
    pub joiner: String,
    pub reference: Option<String>,
}

fn read_group(r: &mut PayloadReader<'_>, with_member_info: bool) -> Result<Group, DecodeError> {
    let mut group = Group {
        group_id: r.read_i32()?,
        owner: r.read_address()?,
        group_name: r.read_string()?,
        description: r.read_nullable_string()?,
        created: r.read_i64()?,
        updated: r.read_optional_timestamp()?,
        is_open: r.read_flag_or_false()?,
        approval_threshold: r.read_i32()?,
        min_block_delay: r.read_i32()?,
        max_block_delay: r.read_i32()?,
        reference: r.read_signature()?,
        creation_group_id: r.read_i32()?,
        reduced_group_name: r.read_string()?,
        member_count: None,
        is_admin: None,
    };
    if with_member_info {
        group.member_count = Some(r.read_i32()?);
        group.is_admin = Some(r.read_flag_or_false()?);
    }
    Ok(group)
}

/// GROUPS. Account-groups responses append member count and admin flag.
pub fn decode_groups(payload: &[u8], with_member_info: bool) -> Result<Vec<Group>, DecodeError> {
    require_min("GROUPS", payload, 4)?;
    let min = GROUP_MIN_LEN + if with_member_info { MEMBER_INFO_LEN } else { 0 };
    PayloadReader::new(payload).read_list(min, |r| read_group(r, with_member_info))
}

pub fn decode_group_members(payload: &[u8]) -> Result<GroupMembers, DecodeError> {
    require_min("GROUP_MEMBERS", payload, 12)?;
    let mut r = PayloadReader::new(payload);
    let member_count = r.read_i32()?;
    let admin_count = r.read_i32()?;
    let members = r.read_list(MEMBER_MIN_LEN, |r| {
        Ok(GroupMember {
            member: r.read_address()?,
            joined: r.read_optional_timestamp()?,
            is_admin: r.read_flag_or_false()?,
        })
    })?;

    Ok(GroupMembers {
        member_count,
        admin_count,
        members,
    })
}

pub fn decode_group_bans(payload: &[u8]) -> Result<Vec<GroupBan>, DecodeError> {
    require_min("GROUP_BANS", payload, 4)?;
    PayloadReader::new(payload).read_list(BAN_MIN_LEN, |r| {
        Ok(GroupBan {
            group_id: r.read_i32()?,
            offender: r.read_address()?,
            admin: r.read_address()?,
            banned: r.read_i64()?,
            reason: r.read_nullable_string()?,
            expiry: r.read_optional_timestamp()?,
            reference: r.read_signature()?,
        })
    })
}

/// GROUP_INVITES: shared by invites-by-address and invites-by-group queries
pub fn decode_group_invites(payload: &[u8]) -> Result<Vec<GroupInvite>, DecodeError> {
    require_min("GROUP_INVITES", payload, 4)?;
    PayloadReader::new(payload).read_list(INVITE_MIN_LEN, |r| {
        Ok(GroupInvite {
            group_id: r.read_i32()?,
            inviter: r.read_address()?,
            invitee: r.read_address()?,
            expiry: r.read_optional_timestamp()?,
            reference: r.read_nullable_base58()?,
        })
    })
}

pub fn decode_group_join_requests(payload: &[u8]) -> Result<Vec<GroupJoinRequest>, DecodeError> {
    require_min("GROUP_JOIN_REQUESTS", payload, 4)?;
    PayloadReader::new(payload).read_list(JOIN_REQUEST_MIN_LEN, |r| {
        Ok(GroupJoinRequest {
            group_id: r.read_i32()?,
            joiner: r.read_address()?,
            reference: r.read_nullable_base58()?,
        })
    })
}
