use crate::fragment::DeliveryErrorKind;

/// What to do about a classified delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Refund the buyer and apologize.
    Refund,
    /// Refund and disable the listing until the operator restocks.
    DeactivateAndRefund,
    /// Escalate to the operator; no automatic refund.
    NotifyOnly,
}

pub fn decide(kind: DeliveryErrorKind) -> Remedy {
    match kind {
        DeliveryErrorKind::InvalidTarget | DeliveryErrorKind::QuantityTooLow => Remedy::Refund,
        DeliveryErrorKind::InsufficientFunds => Remedy::DeactivateAndRefund,
        DeliveryErrorKind::Unrecognized => Remedy::NotifyOnly,
    }
}

/// Buyer-facing explanation for each failure kind, sent before any refund
/// machinery runs.
pub fn buyer_apology(kind: DeliveryErrorKind) -> &'static str {
    match kind {
        DeliveryErrorKind::InvalidTarget => {
            "❌ Неверный Telegram-тег. Сейчас оформим возврат средств."
        }
        DeliveryErrorKind::QuantityTooLow => {
            "❌ Минимум 50 ⭐ для покупки. Сейчас оформим возврат средств."
        }
        DeliveryErrorKind::InsufficientFunds => {
            "❌ Недостаточно средств у продавца для покупки. Сейчас оформим возврат средств."
        }
        DeliveryErrorKind::Unrecognized => {
            "❌ Ошибка обработки заказа. Ожидайте, администратор разберётся вручную."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_refund() {
        assert_eq!(decide(DeliveryErrorKind::InvalidTarget), Remedy::Refund);
        assert_eq!(decide(DeliveryErrorKind::QuantityTooLow), Remedy::Refund);
    }

    #[test]
    fn funds_exhaustion_deactivates_and_refunds() {
        assert_eq!(
            decide(DeliveryErrorKind::InsufficientFunds),
            Remedy::DeactivateAndRefund
        );
    }

    #[test]
    fn unrecognized_failures_only_notify() {
        assert_eq!(decide(DeliveryErrorKind::Unrecognized), Remedy::NotifyOnly);
    }

    #[test]
    fn every_kind_has_an_apology() {
        for kind in [
            DeliveryErrorKind::InvalidTarget,
            DeliveryErrorKind::QuantityTooLow,
            DeliveryErrorKind::InsufficientFunds,
            DeliveryErrorKind::Unrecognized,
        ] {
            assert!(!buyer_apology(kind).is_empty());
        }
    }
}
