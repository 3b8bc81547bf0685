//! Checksum validators for structural identifiers.
//!
//! All functions are pure; a `false` makes the scanner drop the match.

/// Values for characters in odd positions (1-indexed) of a codice fiscale.
/// Digits map like the letter at the same index (`0` as `A`, `1` as `B`, ...).
const ODD_VALUES: [u32; 26] = [
    1, 0, 5, 7, 9, 13, 15, 17, 19, 21, 2, 4, 18, 20, 11, 3, 6, 8, 12, 14, 16, 10, 22, 25, 24, 23,
];

/// Italian fiscal code (codice fiscale) check character.
pub fn is_valid_fiscal_code(code: &str) -> bool {
    let code = code.trim().to_ascii_uppercase();
    let bytes = code.as_bytes();
    if bytes.len() != 16 || !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }

    let sum: u32 = bytes[..15]
        .iter()
        .enumerate()
        .map(|(idx, &b)| {
            let index = usize::from(if b.is_ascii_digit() { b - b'0' } else { b - b'A' });
            if idx % 2 == 0 {
                ODD_VALUES[index]
            } else {
                index as u32
            }
        })
        .sum();

    let check = bytes[15];
    check.is_ascii_uppercase() && u32::from(check - b'A') == sum % 26
}

/// Luhn algorithm for payment card numbers (13 to 19 digits).
pub fn is_valid_luhn(number: &str) -> bool {
    let cleaned: String = number.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = cleaned.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }

    luhn_checksum(&digits) % 10 == 0
}

fn luhn_checksum(digits: &[u32]) -> u32 {
    digits
        .iter()
        .rev()
        .enumerate()
        .map(|(idx, &digit)| {
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum()
}

/// Italian partita IVA: optional `IT` prefix, 11 digits, Luhn check digit.
pub fn is_valid_vat_number(vat: &str) -> bool {
    let cleaned: String = vat.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = cleaned
        .strip_prefix("IT")
        .or_else(|| cleaned.strip_prefix("it"))
        .unwrap_or(&cleaned);

    if digits.len() != 11 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // All-zero numbers pass the checksum but are never issued.
    if digits.chars().all(|c| c == '0') {
        return false;
    }

    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    luhn_checksum(&digits) % 10 == 0
}

/// IBAN per ISO 13616: rearranged number mod 97 must equal 1.
pub fn is_valid_iban(iban: &str) -> bool {
    let cleaned: String = iban
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let bytes = cleaned.as_bytes();

    if bytes.len() < 15 || bytes.len() > 34 {
        return false;
    }
    if !bytes[..2].iter().all(u8::is_ascii_uppercase) || !bytes[2..4].iter().all(u8::is_ascii_digit)
    {
        return false;
    }
    if !bytes.iter().all(u8::is_ascii_alphanumeric) {
        return false;
    }

    let remainder = bytes[4..]
        .iter()
        .chain(&bytes[..4])
        .fold(0u32, |acc, &b| {
            if b.is_ascii_digit() {
                (acc * 10 + u32::from(b - b'0')) % 97
            } else {
                (acc * 100 + u32::from(b - b'A') + 10) % 97
            }
        });

    remainder == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fiscal_code_valid() {
        assert!(is_valid_fiscal_code("RSSMRA85T10A562S"));
        assert!(is_valid_fiscal_code("MRSRSS85M01H501A"));
        assert!(is_valid_fiscal_code(" rssmra85t10a562s "));
    }

    #[test]
    fn test_fiscal_code_invalid() {
        assert!(!is_valid_fiscal_code("RSSMRA85T10A562T"));
        assert!(!is_valid_fiscal_code("MRSRSS85M01H501Z"));
        assert!(!is_valid_fiscal_code("RSSMRA85T10A562"));
        assert!(!is_valid_fiscal_code("RSSMRA85T10A56-S"));
        assert!(!is_valid_fiscal_code(""));
    }

    #[test]
    fn test_luhn_validation() {
        assert!(is_valid_luhn("4111111111111111"));
        assert!(is_valid_luhn("4111 1111 1111 1111"));
        assert!(is_valid_luhn("5500-0055-5555-5559"));
        assert!(!is_valid_luhn("1234567890123456"));
        assert!(!is_valid_luhn("4111"));
        assert!(!is_valid_luhn("4111x11111111111"));
    }

    #[test]
    fn test_vat_number() {
        assert!(is_valid_vat_number("12345678903"));
        assert!(is_valid_vat_number("IT01114601006"));
        assert!(is_valid_vat_number("00743110157"));
        assert!(!is_valid_vat_number("12345678901"));
        assert!(!is_valid_vat_number("00000000000"));
        assert!(!is_valid_vat_number("1234567890"));
    }

    #[test]
    fn test_iban() {
        assert!(is_valid_iban("IT60X0542811101000000123456"));
        assert!(is_valid_iban("IT60 X054 2811 1010 0000 0123 456"));
        assert!(is_valid_iban("gb82west12345698765432"));
        assert!(!is_valid_iban("IT61X0542811101000000123456"));
        assert!(!is_valid_iban("IT60X05"));
        assert!(!is_valid_iban("1T60X0542811101000000123456"));
    }

    proptest! {
        #[test]
        fn fiscal_code_last_char_flip_fails(shift in 1u8..26) {
            let valid = "RSSMRA85T10A562S";
            let last = valid.as_bytes()[15] - b'A';
            let flipped = (b'A' + (last + shift) % 26) as char;
            let code = format!("{}{}", &valid[..15], flipped);
            prop_assert!(!is_valid_fiscal_code(&code));
        }

        #[test]
        fn luhn_single_digit_increment_fails(
            seed in proptest::collection::vec(0u32..10, 12..18),
            pos in any::<prop::sample::Index>(),
        ) {
            // Append the check digit that makes the sequence valid.
            let mut digits = seed.clone();
            digits.push(0);
            let remainder = luhn_checksum(&digits) % 10;
            let last = digits.len() - 1;
            digits[last] = (10 - remainder) % 10;
            let valid: String = digits.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
            prop_assert!(is_valid_luhn(&valid));

            let idx = pos.index(digits.len());
            prop_assume!(digits[idx] <= 8);
            let mut mutated = digits.clone();
            mutated[idx] += 1;
            let mutated: String = mutated.iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
            prop_assert!(!is_valid_luhn(&mutated));
        }
    }
}
