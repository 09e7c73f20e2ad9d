//! Message type codes carried in the frame header.
//!
//! Frames keep the raw `u32`; [`MessageType::from_code`] maps known codes and
//! returns `None` for anything else so unknown traffic can be logged and skipped.

use std::fmt;

macro_rules! message_types {
    ($($name:ident = $code:literal),+ $(,)?) => {
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum MessageType {
            $($name = $code),+
        }

        impl MessageType {
            pub const fn code(self) -> u32 {
                self as u32
            }

            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)+
                    _ => None,
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name)),+
                }
            }
        }
    };
}

message_types! {
    HELLO = 0,
    GOODBYE = 1,
    CHALLENGE = 2,
    RESPONSE = 3,

    HEIGHT_V2 = 10,
    PING = 11,
    PONG = 12,

    PEERS_V2 = 20,
    GET_PEERS = 21,

    BLOCK_SUMMARIES = 70,
    GET_BLOCK_SUMMARIES = 71,
    BLOCK_SUMMARIES_V2 = 72,

    ACCOUNT = 160,
    GET_ACCOUNT = 161,
    ACCOUNT_BALANCE = 170,
    GET_ACCOUNT_BALANCE = 171,

    NAMES = 180,
    GET_ACCOUNT_NAMES = 181,
    GET_NAME = 182,
    GET_NAMES = 183,
    PRIMARY_NAME = 184,
    GET_PRIMARY_NAME = 185,

    TRANSACTIONS = 190,
    GET_ACCOUNT_TRANSACTIONS = 191,

    ACTIVE_CHAT = 200,
    GET_ACTIVE_CHAT = 201,
    CHAT_MESSAGES = 202,
    GET_CHAT_MESSAGES = 203,

    GROUPS = 210,
    GET_GROUPS = 211,
    GET_GROUP = 212,
    GET_ACCOUNT_GROUPS = 213,
    GET_OWNER_GROUPS = 214,
    GROUP_MEMBERS = 215,
    GET_GROUP_MEMBERS = 216,
    GROUP_BANS = 217,
    GET_GROUP_BANS = 218,
    GROUP_INVITES = 219,
    GET_GROUP_INVITES = 220,
    GET_ADDRESS_GROUP_INVITES = 221,
    GROUP_JOIN_REQUESTS = 222,
    GET_GROUP_JOIN_REQUESTS = 223,

    LAST_REFERENCE = 230,
    GET_LAST_REFERENCE = 231,
    UNIT_FEE = 232,
    GET_UNIT_FEE = 233,
    PROCESS_TRANSACTION = 234,
    PROCESS_TRANSACTION_RESPONSE = 235,
    PUBLIC_KEY = 236,
    GET_PUBLIC_KEY = 237,

    POLLS = 240,
    GET_POLL = 241,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

impl From<MessageType> for u32 {
    fn from(value: MessageType) -> Self {
        value.code()
    }
}
