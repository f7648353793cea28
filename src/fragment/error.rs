use serde_json::Value;

/// Taxonomy of provider delivery failures, derived from the shape of the
/// error payload the provider returns with a non-200 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    /// Response carries a `username` field validation error.
    InvalidTarget,
    /// Response carries a `quantity` field validation error (below minimum).
    QuantityTooLow,
    /// The provider wallet cannot cover the order.
    InsufficientFunds,
    /// Anything else, including unparsable bodies. Always escalated with the
    /// raw payload for manual triage.
    Unrecognized,
}

/// Total classification of a raw provider response body. Payloads that match
/// none of the documented shapes map to `Unrecognized`.
pub fn classify_response(raw: &str) -> DeliveryErrorKind {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return DeliveryErrorKind::Unrecognized;
    };
    let Value::Object(map) = value else {
        // Lists ("Unknown error" markers and friends) have no actionable field.
        return DeliveryErrorKind::Unrecognized;
    };
    if map.contains_key("username") {
        return DeliveryErrorKind::InvalidTarget;
    }
    if map.contains_key("quantity") {
        return DeliveryErrorKind::QuantityTooLow;
    }
    if let Some(errors) = map.get("errors").and_then(Value::as_array) {
        let funds_exhausted = errors.iter().any(|entry| {
            entry
                .get("error")
                .and_then(Value::as_str)
                .is_some_and(|msg| msg.contains("Not enough funds"))
        });
        if funds_exhausted {
            return DeliveryErrorKind::InsufficientFunds;
        }
    }
    DeliveryErrorKind::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_error_is_invalid_target() {
        let raw = r#"{"username": ["Invalid username."]}"#;
        assert_eq!(classify_response(raw), DeliveryErrorKind::InvalidTarget);
    }

    #[test]
    fn quantity_error_is_quantity_too_low() {
        let raw = r#"{"quantity": ["Ensure this value is greater than or equal to 50."]}"#;
        assert_eq!(classify_response(raw), DeliveryErrorKind::QuantityTooLow);
    }

    #[test]
    fn funds_exhaustion_marker_is_detected() {
        let raw = r#"{"errors": [{"error": "Not enough funds on the wallet"}]}"#;
        assert_eq!(classify_response(raw), DeliveryErrorKind::InsufficientFunds);
    }

    #[test]
    fn error_list_without_funds_marker_is_unrecognized() {
        let raw = r#"{"errors": [{"error": "Order rejected"}]}"#;
        assert_eq!(classify_response(raw), DeliveryErrorKind::Unrecognized);
    }

    #[test]
    fn unknown_error_list_is_unrecognized() {
        let raw = r#"["Unknown error occurred"]"#;
        assert_eq!(classify_response(raw), DeliveryErrorKind::Unrecognized);
    }

    #[test]
    fn non_json_bodies_are_unrecognized() {
        assert_eq!(
            classify_response("<html>502</html>"),
            DeliveryErrorKind::Unrecognized
        );
        assert_eq!(classify_response(""), DeliveryErrorKind::Unrecognized);
    }

    #[test]
    fn unrelated_dict_is_unrecognized() {
        let raw = r#"{"detail": "throttled"}"#;
        assert_eq!(classify_response(raw), DeliveryErrorKind::Unrecognized);
    }
}
