use serde::de::DeserializeOwned;

use crate::Result;

/// Deserializes a response body. With the `tracing` feature, fields the
/// target type does not know are logged, and a failure names the JSON path.
pub(crate) fn deserialize_with_warnings<T: DeserializeOwned>(text: &str) -> Result<T> {
    #[cfg(feature = "tracing")]
    {
        let mut json = serde_json::Deserializer::from_str(text);
        let mut track = serde_path_to_error::Track::new();
        let mut ignored = Vec::new();

        let result: std::result::Result<T, serde_json::Error> = serde_ignored::deserialize(
            serde_path_to_error::Deserializer::new(&mut json, &mut track),
            |path| ignored.push(path.to_string()),
        );

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(path = %track.path(), error = %e, "failed to deserialize response");
                return Err(e.into());
            }
        };
        json.end()?;

        for field in ignored {
            tracing::warn!(field = %field, "ignored unknown field in response");
        }

        Ok(value)
    }

    #[cfg(not(feature = "tracing"))]
    {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::Kind;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Room {
        id: String,
    }

    #[test]
    fn tolerates_unknown_fields() {
        let room: Room = deserialize_with_warnings(r#"{"id":"r1","extra":true}"#).unwrap();
        assert_eq!(room, Room { id: "r1".to_owned() });
    }

    #[test]
    fn reports_type_errors() {
        let err = deserialize_with_warnings::<Room>(r#"{"id":5}"#).unwrap_err();
        assert_eq!(err.kind(), Kind::Internal);
    }
}
