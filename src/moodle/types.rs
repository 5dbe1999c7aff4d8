//! Webservice payload types.
//!
//! Only the fields the mirror needs are modelled; everything else in the
//! remote responses is ignored, except in [`CourseContents`], which keeps
//! the course tree exactly as received. Remote strings may be `null`, so
//! most text fields go through [`null_as_default`].

use serde::{Deserialize, Deserializer, Serialize};

/// Token pair returned by a successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Access token sent as `wstoken` on every webservice call.
    pub token: String,
    /// Private token, present when the service grants one.
    pub private_token: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &redact(&self.token))
            .field("private_token", &self.private_token.as_deref().map(redact))
            .finish()
    }
}

/// Shortens a secret to a loggable prefix.
#[must_use]
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{prefix}...")
}

/// Raw `login/token.php` response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: Option<String>,
    #[serde(rename = "privatetoken")]
    pub private_token: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "errorcode")]
    pub error_code: Option<String>,
}

/// Remote exception envelope returned instead of a payload.
#[derive(Debug, Deserialize)]
pub(crate) struct ExceptionEnvelope {
    pub exception: String,
    #[serde(rename = "errorcode")]
    pub error_code: Option<String>,
    pub message: Option<String>,
}

/// Subset of `core_webservice_get_site_info`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SiteInfo {
    /// Authenticated user's id.
    #[serde(rename = "userid")]
    pub user_id: Option<i64>,
    /// Per-user key enabling `tokenpluginfile.php` downloads.
    #[serde(rename = "userprivateaccesskey", default)]
    pub private_access_key: Option<String>,
    #[serde(rename = "sitename", default, deserialize_with = "null_as_default")]
    pub site_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(rename = "fullname", default, deserialize_with = "null_as_default")]
    pub full_name: String,
}

impl SiteInfo {
    /// Returns the access key when present and non-empty.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        self.private_access_key
            .as_deref()
            .filter(|key| !key.is_empty())
    }
}

/// An enrolled course from `core_enrol_get_users_courses`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Course {
    pub id: i64,
    #[serde(rename = "fullname", default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(rename = "shortname", default, deserialize_with = "null_as_default")]
    pub short_name: String,
    /// Hidden courses are never mirrored.
    #[serde(default, deserialize_with = "flag")]
    pub hidden: bool,
}

/// A course section from `core_course_get_contents`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Section {
    #[serde(default)]
    pub id: i64,
    /// Remote section number.
    #[serde(rename = "section", default)]
    pub index: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modules: Vec<Module>,
}

/// An activity/resource inside a section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Module {
    #[serde(default)]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Module type, e.g. `resource` or `folder`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub modname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contents: Vec<ContentItem>,
}

/// One entry of a module's `contents` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "file")]
    File(FileContent),
    /// URLs, inline content and anything else; never mirrored.
    #[serde(other)]
    Other,
}

/// A downloadable file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(rename = "fileurl", default, deserialize_with = "null_as_default")]
    pub file_url: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl ContentItem {
    /// Returns the file payload for `type: "file"` entries.
    #[must_use]
    pub fn as_file(&self) -> Option<&FileContent> {
        match self {
            Self::File(file) => Some(file),
            Self::Other => None,
        }
    }
}

/// A `core_course_get_contents` payload, typed for the walk and raw for
/// the metadata sidecars.
///
/// `sections` is decoded from `raw`, so `sections[i]` and `raw[i]` always
/// describe the same section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseContents {
    pub sections: Vec<Section>,
    raw: serde_json::Value,
}

impl CourseContents {
    /// Decodes the section list while keeping the original JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when `raw` is not a list of sections.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let sections = Vec::<Section>::deserialize(&raw)?;
        Ok(Self { sections, raw })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The whole payload as received.
    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    /// Section `section` as received.
    #[must_use]
    pub fn raw_section(&self, section: usize) -> Option<&serde_json::Value> {
        self.raw.get(section)
    }

    /// Module `module` of section `section` as received.
    #[must_use]
    pub fn raw_module(&self, section: usize, module: usize) -> Option<&serde_json::Value> {
        self.raw_section(section)?.get("modules")?.get(module)
    }
}

/// One call in a `tool_mobile_call_external_functions` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub function: String,
    /// Arguments, sent JSON-encoded.
    pub arguments: serde_json::Value,
}

impl BatchRequest {
    #[must_use]
    pub fn new(function: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }
}

/// Per-call result inside a batch response.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub error: bool,
    /// JSON-encoded payload (or error object when `error` is true).
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub exception: Option<serde_json::Value>,
}

impl BatchResponse {
    /// Decodes the embedded JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when `data` is missing or not valid JSON.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.data.as_deref().unwrap_or("null"))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchEnvelope {
    pub responses: Vec<BatchResponse>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `true`/`false`, `0`/`1` or `null` for boolean flags.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Int(value)) => value != 0,
        None => false,
    })
}
