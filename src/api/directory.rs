use serde::Deserialize;

/// Directory object served at the CA's base URL, for client
/// self-configuration.
///
/// Both protocol dialects are deserialized into the same view: RFC 8555
/// ([§7.1.1]) uses camelCase keys (`newAccount`, `newNonce`, ...), the
/// legacy draft uses kebab-case (`new-reg`, `new-authz`, ...). Every field
/// is optional here; dialect detection and the all-or-nothing endpoint
/// checks happen in the session setup.
///
/// [§7.1.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.1
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryDoc {
    // RFC 8555 key set.
    #[serde(rename = "newNonce")]
    pub new_nonce: Option<String>,

    #[serde(rename = "newAccount")]
    pub new_account: Option<String>,

    #[serde(rename = "newOrder")]
    pub new_order: Option<String>,

    #[serde(rename = "revokeCert")]
    pub revoke_cert: Option<String>,

    #[serde(rename = "keyChange")]
    pub key_change: Option<String>,

    // Legacy draft key set. Presence of `new-authz` is the V1 detection key.
    #[serde(rename = "new-authz")]
    pub new_authz: Option<String>,

    #[serde(rename = "new-cert")]
    pub new_cert: Option<String>,

    #[serde(rename = "new-reg")]
    pub new_reg: Option<String>,

    #[serde(rename = "revoke-cert")]
    pub revoke_cert_v1: Option<String>,

    pub meta: Option<DirectoryMeta>,
}

/// <https://datatracker.ietf.org/doc/html/rfc8555#section-9.7.6>
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryMeta {
    /// URL identifying the current terms of service (RFC 8555 spelling).
    #[serde(rename = "termsOfService")]
    pub terms_of_service: Option<String>,

    /// Terms of service under the legacy draft spelling.
    #[serde(rename = "terms-of-service")]
    pub terms_of_service_v1: Option<String>,

    /// URL locating a website providing more information about the server.
    pub website: Option<String>,

    /// Hostnames the server recognizes as referring to itself for CAA
    /// record validation.
    #[serde(rename = "caaIdentities")]
    pub caa_identities: Option<Vec<String>>,

    /// Whether newAccount requests must carry an external account binding.
    #[serde(rename = "externalAccountRequired")]
    pub external_account_required: Option<bool>,
}

impl DirectoryMeta {
    pub fn external_account_required(&self) -> bool {
        self.external_account_required.unwrap_or(false)
    }
}
