//! Single-pass parser for pointer-path expressions.
//!
//! Grammar (informal):
//!
//! ```text
//! path         := startAddress ("," offsetExpr)*
//! startAddress := (moduleToken | hexDigits) signedTerm*
//! offsetExpr   := signedTerm+
//! signedTerm   := ["+"|"-"] hexDigits(1..16)
//! moduleToken  := quotedString | bareToken   (terminated by '+', '-', ',' or end)
//! ```
//!
//! A bare start token is a module name unless it parses entirely as a
//! hexadecimal number of at most 16 digits; quoted tokens are always module
//! names. Term chains sum left to right and every intermediate sum must
//! stay within `[-(2^64-1), 2^64-1]` -- an overflowing prefix is rejected
//! even if a later term would bring the sum back in range.

use crate::error::ParseError;
use crate::offset::PathOffset;
use crate::path::PointerPath;

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }
}

pub(crate) fn parse(expression: &str) -> Result<PointerPath, ParseError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyExpression);
    }

    let mut cur = Cursor {
        chars: trimmed.chars().collect(),
        pos: 0,
    };

    let (base_module, start_value) = parse_start_token(&mut cur)?;
    let start_sum = parse_term_chain(&mut cur, start_value.or(base_module.as_ref().map(|_| PathOffset::ZERO)))?;

    let mut base_offset = PathOffset::ZERO;
    let mut offsets = Vec::new();
    match base_module {
        Some(_) => base_offset = start_sum,
        None => {
            if start_sum.is_negative() {
                return Err(ParseError::NegativeBaseAddress);
            }
            offsets.push(start_sum);
        }
    }

    while let Some(',') = cur.peek() {
        cur.advance();
        match cur.peek() {
            None => return Err(ParseError::TrailingOperator(',')),
            Some(',') => {
                return Err(ParseError::AdjacentOperators {
                    operator: ',',
                    position: cur.pos,
                });
            }
            Some(_) => {}
        }
        offsets.push(parse_term_chain(&mut cur, None)?);
    }

    // parse_term_chain stops only at ',' or end, so anything left here is a
    // stray character.
    if let Some(c) = cur.peek() {
        return Err(ParseError::InvalidCharacter {
            character: c,
            position: cur.pos,
        });
    }

    Ok(PointerPath::from_parts(base_module, base_offset, offsets))
}

/// Parse the leading module-or-literal token of the start address.
///
/// Returns the module name (if any) and the literal start value (if the
/// token was a hex number). Both are `None` when the expression opens
/// directly with a signed term.
fn parse_start_token(
    cur: &mut Cursor,
) -> Result<(Option<String>, Option<PathOffset>), ParseError> {
    if cur.peek() == Some('"') {
        cur.advance();
        let mut name = String::new();
        loop {
            match cur.advance() {
                None => return Err(ParseError::UnterminatedQuote),
                Some('"') => break,
                Some(c) => name.push(c),
            }
        }
        if name.is_empty() {
            return Err(ParseError::EmptyModuleName);
        }
        return Ok((Some(name), None));
    }

    let mut token = String::new();
    while let Some(c) = cur.peek() {
        if matches!(c, '+' | '-' | ',') {
            break;
        }
        token.push(c);
        cur.advance();
    }

    if token.is_empty() {
        // Expression opens with an operator. A comma means there is no
        // start address at all; a sign starts a module-less term chain.
        if cur.peek() == Some(',') {
            return Err(ParseError::MissingDigits { position: cur.pos });
        }
        return Ok((None, None));
    }

    let token = token.trim().to_string();
    let is_hex = !token.is_empty()
        && token.len() <= 16
        && token.chars().all(|c| c.is_ascii_hexdigit());
    if is_hex {
        let mut value = PathOffset::ZERO;
        for c in token.chars() {
            // Cannot overflow: at most 16 hex digits fit a u64 exactly.
            value = value
                .push_hex_digit(c.to_digit(16).unwrap_or(0) as u8)
                .unwrap_or(PathOffset::ZERO);
        }
        Ok((None, Some(value)))
    } else {
        Ok((Some(token), None))
    }
}

/// Parse a chain of signed terms up to the next ',' or the end, summing
/// left to right.
///
/// `opened_with` is `Some` when a module or literal token already opened
/// the segment; every following term must then carry an explicit sign.
fn parse_term_chain(
    cur: &mut Cursor,
    opened_with: Option<PathOffset>,
) -> Result<PathOffset, ParseError> {
    let mut sum = opened_with.unwrap_or(PathOffset::ZERO);
    let mut require_sign = opened_with.is_some();

    loop {
        let Some(c) = cur.peek() else {
            return Ok(sum);
        };
        if c == ',' {
            return Ok(sum);
        }

        // Optional sign; mandatory once a previous token closed a term.
        let negative = match c {
            '+' => {
                cur.advance();
                false
            }
            '-' => {
                cur.advance();
                true
            }
            _ if require_sign => {
                return Err(ParseError::InvalidCharacter {
                    character: c,
                    position: cur.pos,
                });
            }
            _ => false,
        };
        let had_sign = matches!(c, '+' | '-');

        let term_start = cur.pos;
        let mut term = PathOffset::new(0, negative);
        let mut digits = 0usize;
        while let Some(d) = cur.peek() {
            let Some(value) = d.to_digit(16) else {
                break;
            };
            digits += 1;
            if digits > 16 {
                return Err(ParseError::TermTooLong {
                    position: term_start,
                });
            }
            // Cannot fail under the 16-digit cap.
            term = term
                .push_hex_digit(value as u8)
                .ok_or(ParseError::TermTooLong {
                    position: term_start,
                })?;
            cur.advance();
        }

        if digits == 0 {
            return match cur.peek() {
                None if had_sign => Err(ParseError::TrailingOperator(c)),
                None => Err(ParseError::MissingDigits { position: cur.pos }),
                Some(next) if matches!(next, '+' | '-') => Err(ParseError::AdjacentOperators {
                    operator: next,
                    position: cur.pos,
                }),
                Some(',') => Err(ParseError::MissingDigits { position: cur.pos }),
                Some(next) => Err(ParseError::InvalidCharacter {
                    character: next,
                    position: cur.pos,
                }),
            };
        }

        sum = sum
            .checked_add(&term)
            .ok_or(ParseError::OffsetSumOutOfRange {
                position: term_start,
            })?;
        require_sign = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets_of(expr: &str) -> Vec<i128> {
        PointerPath::parse(expr)
            .unwrap()
            .offsets()
            .iter()
            .map(|o| {
                let magnitude = o.magnitude() as i128;
                if o.is_negative() { -magnitude } else { magnitude }
            })
            .collect()
    }

    #[test]
    fn test_literal_path_with_hops() {
        let path = PointerPath::parse("1F016644,13,A0,0").unwrap();
        assert_eq!(path.base_module(), None);
        assert_eq!(offsets_of("1F016644,13,A0,0"), vec![0x1F016644, 0x13, 0xA0, 0x0]);
        assert!(path.base_offset().is_zero());
    }

    #[test]
    fn test_module_with_summed_static_terms() {
        let path = PointerPath::parse("mygame.exe+6A-2C+8").unwrap();
        assert_eq!(path.base_module(), Some("mygame.exe"));
        assert_eq!(path.base_offset(), PathOffset::new(0x46, false));
        assert!(path.offsets().is_empty());
    }

    #[test]
    fn test_quoted_module_names_are_never_literals() {
        let path = PointerPath::parse("\"1F016644\"+10").unwrap();
        assert_eq!(path.base_module(), Some("1F016644"));
        assert_eq!(path.base_offset(), PathOffset::new(0x10, false));

        let path = PointerPath::parse("\"my game.exe\"+10,4").unwrap();
        assert_eq!(path.base_module(), Some("my game.exe"));
    }

    #[test]
    fn test_bare_module_terminated_by_operator() {
        let path = PointerPath::parse("mygame.exe-4,10").unwrap();
        assert_eq!(path.base_module(), Some("mygame.exe"));
        assert_eq!(path.base_offset(), PathOffset::new(4, true));
        assert_eq!(path.offsets().len(), 1);
    }

    #[test]
    fn test_negative_hops_allowed_after_start() {
        assert_eq!(offsets_of("1000,-10,+20"), vec![0x1000, -0x10, 0x20]);
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert_eq!(PointerPath::parse(""), Err(ParseError::EmptyExpression));
        assert_eq!(PointerPath::parse("   \t"), Err(ParseError::EmptyExpression));
    }

    #[test]
    fn test_rejects_trailing_operators() {
        assert_eq!(PointerPath::parse("1F,"), Err(ParseError::TrailingOperator(',')));
        assert_eq!(PointerPath::parse("1F+"), Err(ParseError::TrailingOperator('+')));
        assert_eq!(PointerPath::parse("game.exe-"), Err(ParseError::TrailingOperator('-')));
    }

    #[test]
    fn test_rejects_doubled_operators() {
        assert!(matches!(
            PointerPath::parse("1F++2"),
            Err(ParseError::AdjacentOperators { operator: '+', .. })
        ));
        assert!(matches!(
            PointerPath::parse("1F--2"),
            Err(ParseError::AdjacentOperators { operator: '-', .. })
        ));
        assert!(matches!(
            PointerPath::parse("1F,,2"),
            Err(ParseError::AdjacentOperators { operator: ',', .. })
        ));
        assert!(matches!(
            PointerPath::parse("1F+-2"),
            Err(ParseError::AdjacentOperators { operator: '-', .. })
        ));
    }

    #[test]
    fn test_rejects_negative_start_address()  {
        assert_eq!(PointerPath::parse("-A0"), Err(ParseError::NegativeBaseAddress));
        assert_eq!(PointerPath::parse("10-20"), Err(ParseError::NegativeBaseAddress));
        // A negative start is fine when a module anchors the path.
        assert!(PointerPath::parse("game.exe-A0").is_ok());
    }

    #[test]
    fn test_rejects_sign_followed_by_comma() {
        assert!(matches!(
            PointerPath::parse("1F,+,2"),
            Err(ParseError::MissingDigits { .. })
        ));
    }

    #[test]
    fn test_term_digit_limit() {
        // 16 digits is the cap; a 17th is rejected.
        assert!(PointerPath::parse("game.exe+FFFFFFFFFFFFFFFF").is_ok());
        assert!(matches!(
            PointerPath::parse("game.exe+0FFFFFFFFFFFFFFFF"),
            Err(ParseError::TermTooLong { .. })
        ));
    }

    #[test]
    fn test_overflowing_intermediate_sum_is_rejected() {
        // FFFFFFFFFFFFFFFF + 1 overflows even though -2 would rebalance.
        assert!(matches!(
            PointerPath::parse("game.exe+FFFFFFFFFFFFFFFF+1-2"),
            Err(ParseError::OffsetSumOutOfRange { .. })
        ));
        // The same terms in a different order stay in range throughout.
        assert!(PointerPath::parse("game.exe+FFFFFFFFFFFFFFFF-2+1").is_ok());
    }

    #[test]
    fn test_17_hex_digit_bare_token_is_a_module_name() {
        let path = PointerPath::parse("11111111111111111+4").unwrap();
        assert_eq!(path.base_module(), Some("11111111111111111"));
    }

    #[test]
    fn test_rejects_invalid_characters() {
        assert!(matches!(
            PointerPath::parse("1000,13,G0"),
            Err(ParseError::InvalidCharacter { character: 'G', .. })
        ));
        assert!(matches!(
            PointerPath::parse("game.exe+10 20"),
            Err(ParseError::InvalidCharacter { character: ' ', .. })
        ));
    }

    #[test]
    fn test_rejects_unterminated_and_empty_quotes() {
        assert_eq!(PointerPath::parse("\"game.exe+10"), Err(ParseError::UnterminatedQuote));
        assert_eq!(PointerPath::parse("\"\"+10"), Err(ParseError::EmptyModuleName));
    }

    #[test]
    fn test_rejects_leading_comma() {
        assert!(matches!(
            PointerPath::parse(",10"),
            Err(ParseError::MissingDigits { .. })
        ));
    }

    #[test]
    fn test_module_only_path() {
        let path = PointerPath::parse("game.exe").unwrap();
        assert_eq!(path.base_module(), Some("game.exe"));
        assert!(path.base_offset().is_zero());
        assert!(path.offsets().is_empty());
    }
}
