//! Feedback triage: imports product feedback from trackers, forums and CSV
//! exports, scores each item's priority from keywords, sentiment, volume of
//! similar reports and urgency, then groups issues into themes and derives
//! recommendations.

pub mod api_types;
pub mod budget;
pub mod capability;
pub mod chat;
pub mod cluster;
pub mod fetch;
pub mod insights;
pub mod keywords;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod render;
pub mod scoring;
pub mod sentiment;
pub mod similarity;
pub mod store;
pub mod tabular;
