pub mod auth;
pub mod contributors;
pub mod content;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod routes;
pub mod storage;
pub mod walls;

mod convert;

#[cfg(test)]
mod tests;
