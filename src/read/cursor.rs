//! Opaque string cursors.
//!
//! A continuation key is typed as `K` (usually a struct holding the table and index key
//! attributes), serialized to JSON and base64 encoded. The empty string stands for "no
//! cursor", so it can round-trip through query strings and forms.

use crate::common;
use crate::error::{Error, Result};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Serialize, de::DeserializeOwned};
use serde_dynamo::{from_item, to_item};

/// Encode a continuation key; an absent or empty key encodes to `None`.
///
/// ```rust
/// use dynamodb_kit::{common, read::cursor};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize, Serialize)]
/// struct PageKey {
///     pk: String,
///     sk: String,
/// }
///
/// let key = common::Item::from([
///     ("pk".to_string(), common::string_value("users#1")),
///     ("sk".to_string(), common::string_value("profile")),
/// ]);
/// let encoded = cursor::encode::<PageKey>(Some(&key)).unwrap().unwrap();
/// assert_eq!(cursor::decode::<PageKey>(&encoded).unwrap(), Some(key));
/// assert_eq!(cursor::decode::<PageKey>("").unwrap(), None);
/// ```
pub fn encode<K>(cursor: Option<&common::Item>) -> Result<Option<String>>
where
    K: Serialize + DeserializeOwned,
{
    let Some(cursor) = cursor.filter(|cursor| !cursor.is_empty()) else {
        return Ok(None);
    };
    let key: K = from_item(cursor.clone())?;
    let json = serde_json::to_vec(&key).map_err(|err| Error::InvalidCursor(err.to_string()))?;
    Ok(Some(STANDARD.encode(json)))
}

/// Decode a cursor produced by [`encode`]; the empty string decodes to `None`.
pub fn decode<K>(cursor: &str) -> Result<Option<common::Item>>
where
    K: Serialize + DeserializeOwned,
{
    if cursor.is_empty() {
        return Ok(None);
    }
    let json = STANDARD
        .decode(cursor)
        .map_err(|err| Error::InvalidCursor(err.to_string()))?;
    let key: K =
        serde_json::from_slice(&json).map_err(|err| Error::InvalidCursor(err.to_string()))?;
    let item: common::Item = to_item(key)?;
    Ok((!item.is_empty()).then_some(item))
}
