//! Compact URI form of a [`TimelineDescriptor`], used to persist the current
//! timeline across restarts and to open a timeline from a link.
//!
//! ```text
//! timeline://local/account/<id>/kind/<code>/combined/<0|1>/subject/<id>[?q=<query>]
//! ```

use tracing::debug;
use url::Url;

use crate::models::{
    descriptor::{AccountRef, TimelineDescriptor},
    kind::TimelineKind,
};

const SCHEME: &str = "timeline";
const HOST: &str = "local";
const SEARCH_PARAM: &str = "q";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("not a URI: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected scheme or host in {0}")]
    Scheme(String),
    #[error("missing path segment '{0}'")]
    MissingSegment(&'static str),
    #[error("invalid number '{value}' for '{segment}'")]
    InvalidNumber {
        segment: &'static str,
        value: String,
    },
    #[error("unknown timeline kind '{0}'")]
    UnknownKind(String),
    #[error("unexpected path segment '{0}'")]
    UnexpectedSegment(String),
}

pub fn encode(descriptor: &TimelineDescriptor) -> String {
    let scope = descriptor.account_scope();
    let mut url = format!(
        "{SCHEME}://{HOST}/account/{}/kind/{}/combined/{}/subject/{}",
        scope.account_id(),
        descriptor.kind().save(),
        u8::from(scope.is_combined()),
        descriptor.selected_subject_id(),
    );
    if !descriptor.search_query().is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(SEARCH_PARAM, descriptor.search_query())
            .finish();
        url.push('?');
        url.push_str(&query);
    }
    url
}

pub fn decode(input: &str) -> Result<TimelineDescriptor, ParseError> {
    let url = Url::parse(input)?;
    if url.scheme() != SCHEME || url.host_str() != Some(HOST) {
        return Err(ParseError::Scheme(input.to_owned()));
    }
    let mut segments = url
        .path_segments()
        .ok_or(ParseError::MissingSegment("account"))?;

    let mut next = |name: &'static str| -> Result<String, ParseError> {
        match (segments.next(), segments.next()) {
            (Some(key), Some(value)) if key == name => Ok(value.to_owned()),
            _ => Err(ParseError::MissingSegment(name)),
        }
    };
    let account_id = parse_number("account", &next("account")?)?;
    let kind_code = next("kind")?;
    let combined = parse_number("combined", &next("combined")?)? != 0;
    let subject_id = parse_number("subject", &next("subject")?)?;
    if let Some(extra) = segments.next().filter(|segment| !segment.is_empty()) {
        return Err(ParseError::UnexpectedSegment(extra.to_owned()));
    }

    let kind = TimelineKind::load(&kind_code);
    if kind.is_unknown() {
        return Err(ParseError::UnknownKind(kind_code));
    }
    let account_scope = if combined {
        AccountRef::Combined
    } else {
        AccountRef::Account(account_id)
    };
    let search_query = url
        .query_pairs()
        .find(|(key, _)| key == SEARCH_PARAM)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    Ok(TimelineDescriptor::new(kind, account_scope)
        .with_selected_subject(subject_id)
        .with_search_query(search_query))
}

/// Malformed input resolves to the empty descriptor, meaning "no timeline to load".
pub fn decode_or_empty(input: &str) -> TimelineDescriptor {
    decode(input).unwrap_or_else(|e| {
        debug!("Couldn't decode timeline '{input}': {e}");
        TimelineDescriptor::empty()
    })
}

fn parse_number(segment: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        segment,
        value: value.to_owned(),
    })
}
