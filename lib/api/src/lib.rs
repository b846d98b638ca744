//! # SoleScope API
//!
//! HTTP surface for SoleScope, served with actix-web.
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/predict` | multipart `file`, returns a prediction |
//! | POST | `/add-to-inventory` | multipart inventory upsert |
//! | GET | `/inventory` | all inventory records |
//! | GET | `/image/{blob_ref}` | an attached inventory image |
//! | GET | `/reference/{path}` | a reference image beneath the library root |
//! | POST | `/index/{category}/rebuild?augment=bool` | force an index rebuild |

pub mod rest;

pub use rest::{RestApi, ALLOWED_EXTENSIONS};
