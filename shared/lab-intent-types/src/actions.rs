use core::fmt;
use core::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Which registry entry point an intent targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Action,
    Reservation,
}

impl IntentKind {
    /// Discriminator used by the ceremony service to locate the payload.
    pub fn payload_key(self) -> &'static str {
        match self {
            IntentKind::Action => "actionPayload",
            IntentKind::Reservation => "reservationPayload",
        }
    }

    pub fn allows(self, action: ActionCode) -> bool {
        action.kind() == self
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Action => f.write_str("action"),
            IntentKind::Reservation => f.write_str("reservation"),
        }
    }
}

/// Action codes understood by the intent registry (`uint8 action`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionCode {
    LabAdd = 1,
    LabAddAndList = 2,
    LabSetUri = 3,
    LabUpdate = 4,
    LabDelete = 5,
    LabList = 6,
    LabUnlist = 7,

    RequestBooking = 8,
    CancelRequestBooking = 9,
    CancelBooking = 10,

    RequestFunds = 11,
}

impl ActionCode {
    pub const ALL: [ActionCode; 11] = [
        ActionCode::LabAdd,
        ActionCode::LabAddAndList,
        ActionCode::LabSetUri,
        ActionCode::LabUpdate,
        ActionCode::LabDelete,
        ActionCode::LabList,
        ActionCode::LabUnlist,
        ActionCode::RequestBooking,
        ActionCode::CancelRequestBooking,
        ActionCode::CancelBooking,
        ActionCode::RequestFunds,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Booking creation is the only reservation-kind action; everything else
    /// goes through `registerActionIntent`.
    pub fn kind(self) -> IntentKind {
        match self {
            ActionCode::RequestBooking => IntentKind::Reservation,
            _ => IntentKind::Action,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionCode::LabAdd => "LAB_ADD",
            ActionCode::LabAddAndList => "LAB_ADD_AND_LIST",
            ActionCode::LabSetUri => "LAB_SET_URI",
            ActionCode::LabUpdate => "LAB_UPDATE",
            ActionCode::LabDelete => "LAB_DELETE",
            ActionCode::LabList => "LAB_LIST",
            ActionCode::LabUnlist => "LAB_UNLIST",
            ActionCode::RequestBooking => "REQUEST_BOOKING",
            ActionCode::CancelRequestBooking => "CANCEL_REQUEST_BOOKING",
            ActionCode::CancelBooking => "CANCEL_BOOKING",
            ActionCode::RequestFunds => "REQUEST_FUNDS",
        }
    }

    pub fn is_cancellation(self) -> bool {
        matches!(
            self,
            ActionCode::CancelRequestBooking | ActionCode::CancelBooking
        )
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognised action code or name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action `{}`", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl TryFrom<u8> for ActionCode {
    type Error = UnknownAction;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ActionCode::*;
        let action = match value {
            1 => LabAdd,
            2 => LabAddAndList,
            3 => LabSetUri,
            4 => LabUpdate,
            5 => LabDelete,
            6 => LabList,
            7 => LabUnlist,
            8 => RequestBooking,
            9 => CancelRequestBooking,
            10 => CancelBooking,
            11 => RequestFunds,
            _ => return Err(UnknownAction(value.to_string())),
        };
        Ok(action)
    }
}

impl FromStr for ActionCode {
    type Err = UnknownAction;

    /// Accepts the numeric code or the upper-snake name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return ActionCode::try_from(code);
        }
        ActionCode::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownAction(trimmed.to_string()))
    }
}

impl Serialize for ActionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ActionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => u8::try_from(code)
                .map_err(|_| UnknownAction(code.to_string()))
                .and_then(ActionCode::try_from)
                .map_err(de::Error::custom),
            Raw::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}
