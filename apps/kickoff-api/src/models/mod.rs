pub mod account;
pub mod chat_message;
pub mod enrollment;
pub mod sport_match;
