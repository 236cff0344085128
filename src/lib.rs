//! Transport and session core for ACME (Automatic Certificate Management
//! Environment) providers such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! This crate covers the protocol plumbing underneath certificate
//! management: it discovers a CA's endpoint directory, keeps a signed
//! request session alive (replay nonces, account binding), frames request
//! bodies as JWS objects, and turns [RFC 7807] problem documents into a
//! structured error taxonomy. Both protocol dialects are supported behind
//! one [`Session`]: [RFC 8555] and the earlier draft dialect still spoken
//! by some private CAs. Ordering, authorization challenges and certificate
//! handling belong to the layer above and are out of scope here.
//!
//! # Usage
//!
//! Create a [`Session`] for a directory URL, bind an account (from an
//! [`AccountStore`] or freshly generated), then issue requests:
//!
//! ```no_run
//! use acme_session::Session;
//!
//! # async fn demo() -> acme_session::Result<()> {
//! let mut session = Session::create(
//!     "https://acme-staging-v02.api.letsencrypt.org/directory",
//!     None,
//!     "my-server",
//! )?;
//!
//! session.setup().await?;
//! let dir_url = session.base_url().to_owned();
//! let directory = session.get_json(&dir_url).await?;
//! println!("{directory:#}");
//! # Ok(())
//! # }
//! ```
//!
//! Signed POSTs take their payload from an `on_init` handler and route the
//! response through `on_json` or `on_res`; `badNonce` rejections are
//! retried automatically with the server-supplied fresh nonce.
//!
//! [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
//! [RFC 8555]: https://datatracker.ietf.org/doc/html/rfc8555

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod acct;
mod error;
mod jws;
mod req;
mod request;
mod session;
mod store;

pub mod api;


pub use reqwest::Method;

pub use crate::{
    acct::{AcmeAccount, AcmeKey},
    error::{AcmeError, ErrorKind, Result},
    req::HttpResponse,
    request::Handlers,
    session::{Dialect, Session, V1Endpoints, V2Endpoints},
    store::{AccountStore, StoreError},
};
