//! Property tests for failure classification and amount parsing

#[cfg(test)]
mod classification_properties {
    use proptest::prelude::*;
    use spl_send::address::{classify_identifier, IdentifierKind};
    use spl_send::classifier::{classify, classify_message, FailureSignal, OutcomeKind};
    use spl_send::tx_builder::parse_amount;
    use spl_send::TransferError;

    proptest! {
        #[test]
        fn base58_strings_are_addresses(input in "[1-9A-HJ-NP-Za-km-z]{32,44}") {
            prop_assert_eq!(classify_identifier(&input), IdentifierKind::Address);
        }

        #[test]
        fn well_formed_emails_are_emails(input in "[a-z0-9_]{1,30}@[a-z0-9]{1,30}\\.[a-z]{2,6}") {
            prop_assert_eq!(classify_identifier(&input), IdentifierKind::Email);
        }

        #[test]
        fn ambiguous_glyphs_are_invalid(input in "[0OIl]{32,44}") {
            prop_assert_eq!(classify_identifier(&input), IdentifierKind::Invalid);
        }

        #[test]
        fn two_at_signs_are_invalid(local in "[a-z]{1,10}", domain in "[a-z]{1,10}") {
            let input = format!("{local}@{local}@{domain}.com");
            prop_assert_eq!(classify_identifier(&input), IdentifierKind::Invalid);
        }

        #[test]
        fn typed_validation_wins_over_message_text(text in ".*") {
            let err = TransferError::Validation(text);
            prop_assert_eq!(classify(FailureSignal::Error(&err)), OutcomeKind::InvalidInput);
        }

        #[test]
        fn insufficient_funds_is_gas_in_any_context(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
            let message = format!("{prefix}Insufficient Funds{suffix}");
            prop_assert_eq!(classify_message(&message), OutcomeKind::InsufficientGas);
        }

        #[test]
        fn unknown_text_is_network_error(text in "[0-9]{1,40}") {
            prop_assert_eq!(classify_message(&text), OutcomeKind::NetworkError);
        }

        #[test]
        fn amount_parsing_is_exact(whole in 0u64..1_000_000, frac in 0u64..1_000_000) {
            prop_assume!(whole > 0 || frac > 0);
            let input = format!("{whole}.{frac:06}");
            prop_assert_eq!(parse_amount(&input, 6).unwrap(), whole * 1_000_000 + frac);
        }

        #[test]
        fn excess_precision_is_floored(whole in 1u64..1_000, digits in "[0-9]{7,12}") {
            let input = format!("{whole}.{digits}");
            let kept: u64 = digits[..6].parse().unwrap();
            prop_assert_eq!(parse_amount(&input, 6).unwrap(), whole * 1_000_000 + kept);
        }
    }

    #[test]
    fn http_kind_field_is_authoritative() {
        let body = r#"{"error":"Ledger request failed","message":"user rejected","kind":"NETWORK_ERROR"}"#;
        assert_eq!(
            classify(FailureSignal::Http { status: 500, body }),
            OutcomeKind::NetworkError
        );
    }
}
