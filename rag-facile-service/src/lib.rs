//! RAG Facile chat backend.
//!
//! Streams completions from an OpenAI-compatible endpoint, executes the tool
//! calls the model requests, and injects text extracted from attached PDFs
//! into the prompt.

pub mod api;
pub mod config;
pub mod error;
pub mod openai;
pub mod pdf_context;
pub mod service;
pub mod tools;
pub mod websocket;
