pub mod filter;
pub mod llm;
pub mod markdown;
