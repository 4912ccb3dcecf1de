//! Data Transfer Objects for coordinator communication
//!
//! Request and response bodies for every coordinator endpoint. Tokens ride
//! in the JSON body for runner-level operations; artifact endpoints use a
//! dedicated header instead (see forge-client).

pub mod job;
pub mod runner;
