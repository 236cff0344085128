//! The signed-request pipeline: dialect pre-flight, nonce handling, JWS
//! framing, dispatch, response demultiplexing and transient retry.

use std::{future::Future, pin::Pin};

use reqwest::{header::HeaderMap, Method};

use crate::{
    api::Problem,
    error::{AcmeError, Result},
    jws::{self, ProtectedHeaders},
    req::{json_body, HttpResponse, CONTENT_TYPE_JOSE, CONTENT_TYPE_PROBLEM},
    session::{Endpoints, Session},
};

/// Key representation in the JWS protected header.
///
/// `Kid` references the account URL; `Jwk` embeds the public key and is
/// reserved for requests made before the server knows the account
/// (newAccount). Under the legacy draft the public key is always embedded,
/// whatever the form says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyForm {
    Jwk,
    Kid,
}

/// Scratch state for one logical request, alive across badNonce re-sends
/// and dropped on every terminal outcome.
struct AcmeRequest {
    method: Method,
    url: String,
    key_form: KeyForm,
    protected: ProtectedHeaders,
    body: Option<String>,
    retries_left: u32,
}

type InitFn<'a> = Box<dyn FnMut() -> Result<serde_json::Value> + Send + 'a>;
type JsonFn<'a> = Box<dyn FnMut(&HeaderMap, &serde_json::Value) -> Result<()> + Send + 'a>;
type ResFn<'a> = Box<dyn FnMut(&HttpResponse) -> Result<()> + Send + 'a>;

/// Per-request callbacks.
///
/// `on_init` produces the payload to sign (POST only). On success the
/// response goes to `on_json` when it parses as JSON, falling through to
/// `on_res` for non-JSON bodies. At least one of the two response handlers
/// must be present.
#[derive(Default)]
pub struct Handlers<'a> {
    pub(crate) on_init: Option<InitFn<'a>>,
    pub(crate) on_json: Option<JsonFn<'a>>,
    pub(crate) on_res: Option<ResFn<'a>>,
}

impl<'a> Handlers<'a> {
    pub fn new() -> Handlers<'a> {
        Handlers::default()
    }

    pub fn on_init(mut self, f: impl FnMut() -> Result<serde_json::Value> + Send + 'a) -> Self {
        self.on_init = Some(Box::new(f));
        self
    }

    pub fn on_json(
        mut self,
        f: impl FnMut(&HeaderMap, &serde_json::Value) -> Result<()> + Send + 'a,
    ) -> Self {
        self.on_json = Some(Box::new(f));
        self
    }

    pub fn on_res(mut self, f: impl FnMut(&HttpResponse) -> Result<()> + Send + 'a) -> Self {
        self.on_res = Some(Box::new(f));
        self
    }
}

impl Session {
    /// Dispatch one request through the pipeline.
    ///
    /// Methods other than GET, HEAD and POST are rejected with
    /// [`NotImplemented`](crate::ErrorKind::NotImplemented).
    pub async fn request(
        &mut self,
        method: Method,
        url: &str,
        handlers: Handlers<'_>,
    ) -> Result<()> {
        self.request_with_form(method, url, KeyForm::Kid, handlers)
            .await
    }

    pub(crate) async fn request_with_form(
        &mut self,
        method: Method,
        url: &str,
        key_form: KeyForm,
        mut handlers: Handlers<'_>,
    ) -> Result<()> {
        assert!(!url.is_empty(), "request without url");
        assert!(
            handlers.on_json.is_some() || handlers.on_res.is_some(),
            "request without a response handler"
        );

        let mut req = AcmeRequest {
            method,
            url: url.to_owned(),
            key_form,
            protected: ProtectedHeaders::default(),
            body: None,
            retries_left: self.max_retries,
        };

        // The server may invalidate the nonce at any time; recover by
        // re-sending with the fresh one from the error response, up to the
        // retry budget. Pre-flight failures propagate right away and do not
        // count against it.
        loop {
            self.prepare(&mut req, &mut handlers).await?;

            match self.dispatch(&req, &mut handlers).await {
                Err(err) if err.is_transient() && req.retries_left > 0 => {
                    req.retries_left -= 1;
                    log::debug!(
                        "{}: retrying {} {} ({} attempts left)",
                        self.short_name,
                        req.method,
                        req.url,
                        req.retries_left
                    );
                }
                result => return result,
            }
        }
    }

    /// Pre-flight and body assembly. GET and HEAD skip all of it: they
    /// never sign, never attach a nonce, never touch the account key.
    async fn prepare(&mut self, req: &mut AcmeRequest, handlers: &mut Handlers<'_>) -> Result<()> {
        req.protected = ProtectedHeaders::default();
        req.body = None;

        if req.method == Method::GET || req.method == Method::HEAD {
            return Ok(());
        }

        if let Endpoints::Unknown = self.endpoints {
            self.setup_erased().await?;
        }

        if self.nonce.is_none() {
            self.new_nonce().await.map_err(|err| {
                log::warn!(
                    "{}: error retrieving new nonce from ACME server: {err}",
                    self.short_name
                );
                err
            })?;
        }

        // Consume the cached nonce before the transport is engaged; the
        // response sweep restocks the cache.
        req.protected.nonce = self.nonce.take();
        if let Endpoints::V2(_) = self.endpoints {
            req.protected.url = Some(req.url.clone());
        }

        let payload = match handlers.on_init.as_mut() {
            Some(on_init) => Some(on_init()?),
            None => None,
        };
        if let Some(payload) = payload {
            req.body = Some(self.sign_payload(req, &payload)?);
        }

        Ok(())
    }

    /// Directory discovery re-enters the request pipeline, so the future
    /// needs type erasure to stay finite.
    fn setup_erased(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.setup())
    }

    /// HEAD the dialect's nonce resource and capture the Replay-Nonce.
    async fn new_nonce(&mut self) -> Result<()> {
        let url = match &self.endpoints {
            Endpoints::V1(endpoints) => endpoints.new_reg.clone(),
            Endpoints::V2(endpoints) => endpoints.new_nonce.clone(),
            Endpoints::Unknown => {
                return Err(AcmeError::protocol("no nonce resource without a dialect"))
            }
        };

        log::debug!("{}: request new nonce", self.short_name);
        let res = self.http()?.head(&url).await?;
        self.update_nonce(&res);

        if self.nonce.is_none() {
            return Err(AcmeError::protocol(format!(
                "no Replay-Nonce header in response from {url}"
            )));
        }
        Ok(())
    }

    fn sign_payload(&self, req: &AcmeRequest, payload: &serde_json::Value) -> Result<String> {
        let binding = self
            .account
            .as_ref()
            .ok_or_else(|| AcmeError::protocol("signed request without a bound account"))?;

        let key_id = match (&self.endpoints, req.key_form) {
            (Endpoints::Unknown, _) => {
                return Err(AcmeError::protocol("signed request without a dialect"))
            }
            // draft servers always get the embedded public key
            (Endpoints::V1(_), _) => None,
            (Endpoints::V2(_), KeyForm::Jwk) => None,
            (Endpoints::V2(_), KeyForm::Kid) => Some(
                binding.account.url.as_deref().ok_or_else(|| {
                    AcmeError::protocol("account has no URL to use as key identifier")
                })?,
            ),
        };

        log::trace!("{}: acme payload: {payload}", self.short_name);
        let jws = jws::sign(payload, &req.protected, &binding.key, key_id)?;
        Ok(serde_json::to_string(&jws)?)
    }

    async fn dispatch(&mut self, req: &AcmeRequest, handlers: &mut Handlers<'_>) -> Result<()> {
        log::debug!("{}: sending {} {}", self.short_name, req.method, req.url);

        let res = if req.method == Method::GET {
            self.http()?.get(&req.url).await?
        } else if req.method == Method::HEAD {
            self.http()?.head(&req.url).await?
        } else if req.method == Method::POST {
            let body = req.body.clone().unwrap_or_default();
            self.http()?
                .post(&req.url, CONTENT_TYPE_JOSE, body)
                .await?
        } else {
            log::warn!(
                "{}: HTTP method {} against: {}",
                self.short_name,
                req.method,
                req.url
            );
            return Err(AcmeError::NotImplemented(req.method.clone()));
        };

        // Success or not, there might be a nonce in the response.
        self.update_nonce(&res);

        log::trace!("{}: response: {}", self.short_name, res.status());
        if res.status().is_success() {
            if handlers.on_json.is_some() {
                if let Some(json) = json_body(&res)? {
                    log::trace!("{}: response JSON: {json:#}", self.short_name);
                    if let Some(on_json) = handlers.on_json.as_mut() {
                        return on_json(res.headers(), &json);
                    }
                }
                // no JSON in the body; fall through to the raw handler
            }

            if let Some(on_res) = handlers.on_res.as_mut() {
                return on_res(&res);
            }

            Err(AcmeError::protocol(format!(
                "response {} with unexpected content-type {}",
                res.status(),
                res.content_type().unwrap_or("<none>")
            )))
        } else {
            Err(self.inspect_problem(&res))
        }
    }

    /// Classify a non-2xx response: RFC 7807 problem document when there is
    /// one, bare status mapping otherwise.
    fn inspect_problem(&self, res: &HttpResponse) -> AcmeError {
        if res.content_type() == Some(CONTENT_TYPE_PROBLEM) {
            if let Ok(problem) = serde_json::from_slice::<Problem>(res.body()) {
                if problem.is_transient() {
                    log::debug!("{}: acme reports {problem}", self.short_name);
                } else {
                    log::warn!("{}: acme problem {problem}", self.short_name);
                }
                return AcmeError::Problem(problem);
            }
        }

        let status = res.status();
        if !matches!(status.as_u16(), 400 | 403 | 404) {
            log::warn!(
                "{}: acme problem unknown: http status {status}",
                self.short_name
            );
        }
        AcmeError::Status {
            status: status.as_u16(),
            detail: String::from_utf8_lossy(res.body()).into_owned(),
        }
    }

    /// Passive sweep: any response carrying a Replay-Nonce restocks the
    /// cache, replacing whatever was there.
    pub(crate) fn update_nonce(&mut self, res: &HttpResponse) {
        if let Some(nonce) = res.header("Replay-Nonce") {
            log::trace!("{}: extracting new nonce", self.short_name);
            self.nonce = Some(nonce.to_owned());
        }
    }
}
