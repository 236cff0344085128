use reqwest::Method;

use crate::{
    acct::AccountBinding,
    api::DirectoryDoc,
    error::{AcmeError, Result},
    req::HttpClient,
    request::{Handlers, KeyForm},
};

const MAX_RETRIES: u32 = 3;

/// Protocol dialect spoken by the CA.
///
/// `V2` is RFC 8555 (`newAccount`/`newOrder`/`newNonce`); `V1` is the
/// pre-RFC draft (`new-reg`/`new-authz`/`new-cert`). Detection happens on
/// first [`setup`](Session::setup) and is final for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Unknown,
    V1,
    V2,
}

/// Endpoint URLs of a legacy draft directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1Endpoints {
    pub new_authz: String,
    pub new_cert: String,
    pub new_reg: String,
    pub revoke_cert: String,
}

/// Endpoint URLs of an RFC 8555 directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2Endpoints {
    pub new_account: String,
    pub new_order: String,
    pub revoke_cert: String,
    pub key_change: String,
    pub new_nonce: String,
}

/// Dialect tag and endpoint set in one. All dialect-variant behavior in the
/// pipeline is a `match` on this, so an `Unknown` session can neither sign
/// nor resolve a nonce endpoint.
#[derive(Debug, Clone)]
pub(crate) enum Endpoints {
    Unknown,
    V1(V1Endpoints),
    V2(V2Endpoints),
}

/// Client session against one CA directory URL.
///
/// The session owns the HTTP transport, the replay-nonce cache and the
/// account binding, and hands out the signed-request pipeline via
/// [`get`](Session::get), [`post`](Session::post) and friends.
///
/// A session is single-agent: signed POSTs consume the one cached nonce, so
/// callers must serialize requests on a session. Run parallel sessions
/// against the same CA if concurrency is needed; they share nothing.
#[derive(Debug)]
pub struct Session {
    pub(crate) base_url: String,
    pub(crate) endpoints: Endpoints,
    pub(crate) ca_agreement: Option<String>,
    pub(crate) nonce: Option<String>,
    pub(crate) account: Option<AccountBinding>,
    pub(crate) http: Option<HttpClient>,
    pub(crate) user_agent: String,
    pub(crate) proxy_url: Option<String>,
    pub(crate) short_name: String,
    pub(crate) max_retries: u32,
}

impl Session {
    /// Create a session for the CA directory at `base_url`.
    ///
    /// `product` is the host product prefix for the User-Agent header.
    /// No network traffic happens here; the directory is fetched lazily on
    /// first use.
    pub fn create(base_url: &str, proxy_url: Option<&str>, product: &str) -> Result<Session> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|err| AcmeError::protocol(format!("invalid ACME uri ({err}): {base_url}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AcmeError::protocol(format!("ACME uri has no hostname: {base_url}")))?;

        Ok(Session {
            base_url: base_url.to_owned(),
            endpoints: Endpoints::Unknown,
            ca_agreement: None,
            nonce: None,
            account: None,
            http: None,
            user_agent: format!(
                "{product} {}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
            proxy_url: proxy_url.map(str::to_owned),
            short_name: short_name(host),
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch the directory document and bind the dialect and endpoint set.
    ///
    /// Runs implicitly before the first signed POST. Calling it again
    /// refreshes the endpoints; the dialect is settled on first success and
    /// a server that later presents a different dialect is an error.
    pub async fn setup(&mut self) -> Result<()> {
        log::debug!("{}: get directory from {}", self.short_name, self.base_url);

        let url = self.base_url.clone();
        let json = self.get_json(&url).await.map_err(|err| {
            log::warn!(
                "{}: unsuccessful in contacting ACME server at {}: {err}",
                self.short_name,
                self.base_url
            );
            err
        })?;

        let doc = serde_json::from_value::<DirectoryDoc>(json)?;
        let Some((endpoints, agreement)) = resolve_endpoints(&doc) else {
            log::warn!(
                "{}: unable to understand ACME server response. \
                 Wrong ACME protocol version or link?",
                self.short_name
            );
            return Err(AcmeError::protocol("unable to understand ACME server response"));
        };

        // The dialect transitions away from Unknown exactly once.
        match (&self.endpoints, &endpoints) {
            (Endpoints::Unknown, _)
            | (Endpoints::V1(_), Endpoints::V1(_))
            | (Endpoints::V2(_), Endpoints::V2(_)) => {}
            _ => {
                return Err(AcmeError::protocol(
                    "ACME server switched protocol dialect on directory refresh",
                ))
            }
        }

        self.ca_agreement = agreement;
        self.endpoints = endpoints;
        Ok(())
    }

    /// GET `url`, demultiplexing the response into `handlers`.
    pub async fn get(&mut self, url: &str, handlers: Handlers<'_>) -> Result<()> {
        self.request(Method::GET, url, handlers).await
    }

    /// Signed POST to `url`.
    ///
    /// The pipeline discovers the dialect and acquires a nonce as needed,
    /// signs the payload produced by the `on_init` handler under the bound
    /// account key, and retries automatically on `badNonce`.
    pub async fn post(&mut self, url: &str, handlers: Handlers<'_>) -> Result<()> {
        self.request(Method::POST, url, handlers).await
    }

    /// GET `url` and hand back the parsed JSON body.
    pub async fn get_json(&mut self, url: &str) -> Result<serde_json::Value> {
        let mut json = None;

        let handlers = Handlers::new().on_json(|_headers, body| {
            json = Some(body.clone());
            Ok(())
        });
        self.request(Method::GET, url, handlers).await?;

        json.ok_or_else(|| AcmeError::protocol(format!("no JSON content from {url}")))
    }

    /// Signed POST to the dialect's account-creation endpoint, in jwk form.
    ///
    /// This is the one request signed with the embedded public key instead
    /// of the account URL, since the account has no URL before the server
    /// assigns one.
    pub async fn post_new_account(&mut self, handlers: Handlers<'_>) -> Result<()> {
        if let Endpoints::Unknown = self.endpoints {
            self.setup().await?;
        }

        let url = match &self.endpoints {
            Endpoints::V1(endpoints) => endpoints.new_reg.clone(),
            Endpoints::V2(endpoints) => endpoints.new_account.clone(),
            Endpoints::Unknown => {
                return Err(AcmeError::protocol("no account endpoint without a dialect"))
            }
        };

        self.request_with_form(Method::POST, &url, KeyForm::Jwk, handlers)
            .await
    }

    pub fn dialect(&self) -> Dialect {
        match self.endpoints {
            Endpoints::Unknown => Dialect::Unknown,
            Endpoints::V1(_) => Dialect::V1,
            Endpoints::V2(_) => Dialect::V2,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Terms-of-service URL advertised by the directory, if any.
    pub fn ca_agreement(&self) -> Option<&str> {
        self.ca_agreement.as_deref()
    }

    /// Tail of the CA hostname, used to tag log lines.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn endpoints_v1(&self) -> Option<&V1Endpoints> {
        match &self.endpoints {
            Endpoints::V1(endpoints) => Some(endpoints),
            _ => None,
        }
    }

    pub fn endpoints_v2(&self) -> Option<&V2Endpoints> {
        match &self.endpoints {
            Endpoints::V2(endpoints) => Some(endpoints),
            _ => None,
        }
    }

    /// The transport is built on first use so that sessions can be created
    /// without touching the network.
    pub(crate) fn http(&mut self) -> Result<&HttpClient> {
        if self.http.is_none() {
            self.http = Some(HttpClient::new(
                &self.user_agent,
                self.proxy_url.as_deref(),
            )?);
        }
        self.http
            .as_ref()
            .ok_or_else(|| AcmeError::protocol("transport unavailable"))
    }
}

/// Detect the dialect and extract its endpoint set, all-or-nothing.
///
/// `new-authz` marks a legacy draft directory, `newAccount` an RFC 8555
/// one. A directory matching a detection key but missing any required peer
/// yields no binding at all.
fn resolve_endpoints(doc: &DirectoryDoc) -> Option<(Endpoints, Option<String>)> {
    let meta = doc.meta.clone().unwrap_or_default();

    if doc.new_authz.is_some() {
        let endpoints = V1Endpoints {
            new_authz: doc.new_authz.clone()?,
            new_cert: doc.new_cert.clone()?,
            new_reg: doc.new_reg.clone()?,
            revoke_cert: doc.revoke_cert_v1.clone()?,
        };
        Some((Endpoints::V1(endpoints), meta.terms_of_service_v1))
    } else if doc.new_account.is_some() {
        let endpoints = V2Endpoints {
            new_account: doc.new_account.clone()?,
            new_order: doc.new_order.clone()?,
            revoke_cert: doc.revoke_cert.clone()?,
            key_change: doc.key_change.clone()?,
            new_nonce: doc.new_nonce.clone()?,
        };
        Some((Endpoints::V2(endpoints), meta.terms_of_service))
    } else {
        None
    }
}

fn short_name(hostname: &str) -> String {
    let len = hostname.chars().count();
    if len <= 16 {
        hostname.to_owned()
    } else {
        hostname.chars().skip(len - 16).collect()
    }
}
