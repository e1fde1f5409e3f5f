//! NMEA 0183 AIVDM/AIVDO sentence handling
//!
//! Only what the bridge needs: sentence framing, checksum validation,
//! 6-bit de-armoring and a bit reader for the message decoders.
//!
//! ```text
//! \s:rx01,c:1700000000*5A\!AIVDM,1,1,,B,15M:Ih0P1so?Vt@EWFs3Jjht0000,0*4F
//! └──── optional tag block ────┘└─ talker ─┘ │ │ │ │ └─ payload ─┘ │  └ checksum
//!                                     count ─┘ │ │ └ channel    fill bits
//!                                  fragment no ┘ └ sequence id
//! ```

use super::decoder::DecodeError;

/// Framed sentence after checksum validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub talker: &'a str,
    pub fragment_count: u8,
    pub fragment_number: u8,
    pub channel: &'a str,
    pub payload: &'a str,
    pub fill_bits: u8,
}

/// XOR of every byte between the start delimiter and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Removes an NMEA 4.10 tag block (`\...\`) in front of the sentence.
fn strip_tag_block(line: &str) -> Result<&str, DecodeError> {
    match line.strip_prefix('\\') {
        Some(rest) => rest
            .split_once('\\')
            .map(|(_, sentence)| sentence)
            .ok_or_else(|| DecodeError::MalformedSentence("unterminated tag block".to_string())),
        None => Ok(line),
    }
}

pub fn parse_sentence(line: &str) -> Result<Sentence<'_>, DecodeError> {
    let line = strip_tag_block(line.trim())?;

    let body_and_sum = line
        .strip_prefix('!')
        .or_else(|| line.strip_prefix('$'))
        .ok_or_else(|| DecodeError::MalformedSentence("missing start delimiter".to_string()))?;

    let (body, sum) = body_and_sum
        .rsplit_once('*')
        .ok_or_else(|| DecodeError::MalformedSentence("missing checksum".to_string()))?;

    let expected = u8::from_str_radix(sum.trim(), 16)
        .map_err(|_| DecodeError::MalformedSentence(format!("invalid checksum '{}'", sum)))?;
    let actual = checksum(body);
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() != 7 {
        return Err(DecodeError::MalformedSentence(format!(
            "expected 7 fields, found {}",
            parts.len()
        )));
    }

    let talker = parts[0];
    if !(talker.ends_with("VDM") || talker.ends_with("VDO")) {
        return Err(DecodeError::MalformedSentence(format!(
            "unsupported sentence '{}'",
            talker
        )));
    }

    let number = |field: &str, what: &str| {
        field
            .parse::<u8>()
            .map_err(|_| DecodeError::MalformedSentence(format!("invalid {} '{}'", what, field)))
    };

    let fill_bits = number(parts[6], "fill bits")?;
    if fill_bits > 5 {
        return Err(DecodeError::MalformedSentence(format!(
            "fill bits out of range: {}",
            fill_bits
        )));
    }

    Ok(Sentence {
        talker,
        fragment_count: number(parts[1], "fragment count")?,
        fragment_number: number(parts[2], "fragment number")?,
        channel: parts[4],
        payload: parts[5],
        fill_bits,
    })
}

/// Maps an armored payload character to its 6-bit value.
fn sixbit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'W' => Some(c - 48),
        b'`'..=b'w' => Some(c - 56),
        _ => None,
    }
}

/// Bit string de-armored from a sentence payload.
#[derive(Debug, Clone)]
pub struct Bits {
    bytes: Vec<u8>,
    len: usize,
}

impl Bits {
    pub fn from_armored(payload: &str, fill_bits: u8) -> Result<Self, DecodeError> {
        let mut bytes = vec![0u8; (payload.len() * 6).div_ceil(8)];
        let mut pos = 0usize;

        for c in payload.bytes() {
            let value = sixbit(c).ok_or(DecodeError::InvalidArmor(c as char))?;
            for shift in (0..6).rev() {
                if (value >> shift) & 1 == 1 {
                    bytes[pos / 8] |= 0x80 >> (pos % 8);
                }
                pos += 1;
            }
        }

        Ok(Self {
            bytes,
            len: pos.saturating_sub(fill_bits as usize),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bit(&self, index: usize) -> u64 {
        ((self.bytes[index / 8] >> (7 - index % 8)) & 1) as u64
    }

    fn ensure(&self, start: usize, width: usize) -> Result<(), DecodeError> {
        if start + width > self.len {
            return Err(DecodeError::Truncated {
                needed: start + width,
                available: self.len,
            });
        }
        Ok(())
    }

    pub fn unsigned(&self, start: usize, width: usize) -> Result<u64, DecodeError> {
        self.ensure(start, width)?;
        Ok((start..start + width).fold(0, |acc, i| (acc << 1) | self.bit(i)))
    }

    /// Two's complement value of `width` bits.
    pub fn signed(&self, start: usize, width: usize) -> Result<i64, DecodeError> {
        let raw = self.unsigned(start, width)?;
        let sign = 1u64 << (width - 1);
        Ok(if raw & sign != 0 {
            raw as i64 - (1i64 << width)
        } else {
            raw as i64
        })
    }

    pub fn flag(&self, start: usize) -> Result<bool, DecodeError> {
        Ok(self.unsigned(start, 1)? == 1)
    }

    /// Six-bit ASCII text, with `@` padding and trailing spaces removed.
    pub fn text(&self, start: usize, width: usize) -> Result<String, DecodeError> {
        self.ensure(start, width)?;
        let mut text = String::with_capacity(width / 6);
        for offset in (0..width / 6).map(|i| start + i * 6) {
            let value = self.unsigned(offset, 6)? as u8;
            let ascii = if value < 32 { value + 64 } else { value };
            text.push(ascii as char);
        }
        let trimmed = text.trim_end_matches(['@', ' ']).to_string();
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_fragment_sentence() {
        let sentence =
            parse_sentence("!AIVDM,1,1,,A,15RTgt0PAso;90TKcjM8h6g208CQ,0*4A").unwrap();
        assert_eq!(sentence.talker, "AIVDM");
        assert_eq!(sentence.fragment_count, 1);
        assert_eq!(sentence.fragment_number, 1);
        assert_eq!(sentence.channel, "A");
        assert_eq!(sentence.payload, "15RTgt0PAso;90TKcjM8h6g208CQ");
        assert_eq!(sentence.fill_bits, 0);
    }

    #[test]
    fn strips_tag_block() {
        let sentence = parse_sentence(
            "\\s:rx01,c:1700000000*00\\!AIVDM,1,1,,A,15RTgt0PAso;90TKcjM8h6g208CQ,0*4A",
        )
        .unwrap();
        assert_eq!(sentence.payload, "15RTgt0PAso;90TKcjM8h6g208CQ");
    }

    #[test]
    fn rejects_bad_checksum() {
        let err = parse_sentence("!AIVDM,1,1,,A,15RTgt0PAso;90TKcjM8h6g208CQ,0*4B").unwrap_err();
        assert_eq!(
            err,
            DecodeError::ChecksumMismatch {
                expected: 0x4B,
                actual: 0x4A
            }
        );
    }

    #[test]
    fn rejects_missing_delimiter() {
        assert!(matches!(
            parse_sentence("AIVDM,1,1,,A,15RTgt0PAso;90TKcjM8h6g208CQ,0*4A"),
            Err(DecodeError::MalformedSentence(_))
        ));
    }

    #[test]
    fn dearmors_payload() {
        let bits = Bits::from_armored("15RTgt0PAso;90TKcjM8h6g208CQ", 0).unwrap();
        assert_eq!(bits.len(), 168);
        assert_eq!(bits.unsigned(0, 6).unwrap(), 1);
        assert_eq!(bits.unsigned(8, 30).unwrap(), 371798000);
        assert_eq!(bits.signed(42, 8).unwrap(), -127);
    }

    #[test]
    fn fill_bits_shorten_the_bit_string() {
        let bits = Bits::from_armored("85Mwqgh0Gh00000000", 4).unwrap();
        assert_eq!(bits.len(), 104);
        assert!(matches!(
            bits.unsigned(100, 8),
            Err(DecodeError::Truncated { needed: 108, available: 104 })
        ));
    }

    #[test]
    fn rejects_invalid_armor() {
        assert_eq!(
            Bits::from_armored("15R~", 0).unwrap_err(),
            DecodeError::InvalidArmor('~')
        );
    }
}
