//! Error types for `tapin-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::event::CardId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("card id {0:?} is empty after normalization")]
  InvalidCardId(String),

  #[error("card {0} is not registered")]
  UnknownCard(CardId),

  #[error("member not found: {0}")]
  UnknownMember(Uuid),

  #[error("member {0} has no card bound")]
  MemberNotBound(Uuid),

  #[error("card {0} is already bound to another member")]
  CardAlreadyBound(CardId),

  #[error("registration token not found")]
  TokenInvalid,

  #[error("registration token has already been used")]
  TokenUsed,

  #[error("registration token has expired")]
  TokenExpired,

  #[error("token ttl of {0} minutes is out of range")]
  InvalidTtl(i64),

  #[error("invalid date range: {from} is after {to}")]
  InvalidDateRange { from: NaiveDate, to: NaiveDate },

  #[error("team not found: {0}")]
  TeamNotFound(Uuid),

  #[error("team name {0:?} is already taken")]
  TeamNameTaken(String),

  #[error("team {team_id} still has {members} member(s) assigned")]
  TeamNotEmpty { team_id: Uuid, members: u64 },

  #[error("invalid utc offset: {0} minutes")]
  InvalidUtcOffset(i32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
