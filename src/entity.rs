//! Typed rows of the membership tables replicated through CDC.

/// A gym member, table `data_peserta`. Keyed by `gold_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Member {
    pub gold_id: i64,
    pub gold_email: String,
    pub gold_password: String,
    pub gold_nama: String,
    pub gold_nomorhp: String,
    pub gold_nomorkartu: String,
    pub gold_cvv: String,
    /// Card expiry as `YYYYMMDD`.
    pub gold_expireddate: String,
    pub gold_namapemegangkartu: String,
    pub gold_otp: Option<String>,
}

/// A subscription header, table `subscription`. Keyed by `gold_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subscription {
    pub gold_id: i64,
    pub gold_totalharga: Option<f64>,
    pub gold_validasipayment: String,
    pub gold_otp: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub gold_lastupdate: Option<String>,
}

/// A login token, table `data_token`. Keyed by `gold_email`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoginToken {
    pub gold_email: String,
    pub gold_token: String,
}
