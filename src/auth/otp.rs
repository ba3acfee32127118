use rand::Rng;

pub const OTP_DIGITS: u32 = 5;

/// `OTP_DIGITS` random decimal digits, never with a leading zero.
pub fn generate_otp() -> String {
    let low = 10u32.pow(OTP_DIGITS - 1);
    rand::thread_rng().gen_range(low..low * 10).to_string()
}

pub fn otp_key(email: &str) -> String {
    format!("otp:{email}")
}

pub fn otp_mail_body(code: &str) -> String {
    format!("<h1>otp: {code}</h1>")
}
