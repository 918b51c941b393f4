use rand::Rng;

pub const BILL_CODE_PREFIX: &str = "BG";
pub const PAYER_ID_PREFIX: &str = "BDT";

/// A fresh pair of local correlation keys for one payment attempt.
///
/// Nothing guarantees uniqueness; the server may hand back a different bill
/// code and that value wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    pub bill_code: String,
    pub payer_id: String,
}

impl Identifiers {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            bill_code: format!("{}{}", BILL_CODE_PREFIX, six_digits(&mut rng)),
            payer_id: format!("{}{}", PAYER_ID_PREFIX, six_digits(&mut rng)),
        }
    }
}

fn six_digits<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(100_000..1_000_000)
}
