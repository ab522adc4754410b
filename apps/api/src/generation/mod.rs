// Statement generation: profile in, gated three-answer draft out.
// Retrieval, blueprint, length control and regeneration live here.
// All model calls go through llm_client.

pub mod generator;
pub mod handlers;
pub mod length;
pub mod pipeline;
pub mod profile;
pub mod prompts;
pub mod retrieval;
pub mod synthetic;
