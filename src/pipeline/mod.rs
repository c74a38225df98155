//! Pipeline stages for PDF-to-JSON extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped (a different rasteriser, a scripted model
//! transport) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ invoke ──▶ parse
//! (URL/path) (pdfium)  (PNG/b64)  (Bedrock,   (fences,
//!                                  failover)   strict JSON)
//! ```
//!
//! 1. [`input`]  — resolve the user-supplied path or URL to PDF bytes
//! 2. [`render`] — rasterise every page to a PNG in scratch storage; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — PNG encoding and base64 for the request body
//! 4. [`invoke`] — one model call, tried across regions in fixed order; the
//!    network itself lives behind [`invoke::ModelTransport`], implemented for
//!    Bedrock in [`bedrock`]
//! 5. [`parse`]  — strip code fences and parse the answer as JSON, or record
//!    a parse-failure value

pub mod bedrock;
pub mod encode;
pub mod input;
pub mod invoke;
pub mod parse;
pub mod render;
