/// Fields extracted from one bank notification email. Every field is
/// optional: the extractor fills what it can and leaves the rest `None`.
/// Only `tracking_key` gates persistence downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFields {
    pub tracking_key: Option<String>,
    pub source_account: Option<String>,
    pub payer_name: Option<String>,
    pub payment_concept: Option<String>,
    pub reference: Option<String>,
    pub issuing_institution: Option<String>,
    /// Normalized amount string with thousands separators removed, e.g. "1234.56".
    pub amount: Option<String>,
    /// Raw application date as printed in the email, "dd/MM/yyyy HH:mm:ss".
    pub applied_at: Option<String>,
}
