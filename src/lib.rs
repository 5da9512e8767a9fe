pub mod chat;
pub mod chunking;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod messages;
pub mod models;
pub mod rag;
pub mod retriever;
pub mod sitemap;
pub mod store;
