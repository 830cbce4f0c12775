pub mod export;
pub mod generator;
pub mod llm;
pub mod outline;
pub mod prompts;
pub mod session;
