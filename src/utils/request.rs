use std::collections::BTreeSet;

use pingora_http::RequestHeader;
use url::form_urlencoded;

use crate::core::{
    error::{RalError, RalResult},
    model::{EntityId, Family, Request},
};

/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Retrieves a request header value, `None` if absent or not valid UTF-8.
pub fn get_req_header_value<'a>(req_header: &'a RequestHeader, key: &str) -> Option<&'a str> {
    req_header
        .headers
        .get(key)
        .and_then(|value| value.to_str().ok())
}

/// Every percent-decoded value of a query parameter, in order of appearance.
pub fn query_values(req_header: &RequestHeader, name: &str) -> Vec<String> {
    req_header
        .uri
        .query()
        .map(|query| {
            form_urlencoded::parse(query.as_bytes())
                .filter(|(k, _)| k == name)
                .map(|(_, v)| v.trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Parses id values given either repeated or comma separated.
pub fn parse_id_set<S: AsRef<str>>(name: &str, values: &[S]) -> RalResult<BTreeSet<EntityId>> {
    let mut ids = BTreeSet::new();
    for value in values {
        for raw in value
            .as_ref()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            let id = raw
                .parse::<EntityId>()
                .map_err(|_| RalError::Validation(format!("{name} has invalid id '{raw}'")))?;
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Builds the aggregate request from `test1Id`..`test4Id`; absent means empty.
pub fn request_from_query(req_header: &RequestHeader) -> RalResult<Request> {
    Family::ALL.iter().try_fold(Request::default(), |request, &family| {
        let name = format!("test{family}Id");
        let ids = parse_id_set(&name, query_values(req_header, &name).as_slice())?;
        Ok(request.with_ids(family, ids))
    })
}
