//! # Note-stream bar parsing
//!
//! Bars are token runs between `|` markers. Parses tuplet groups and
//! rhythm modifiers via duration-class-by-letter-suffix instead of
//! slash-count, plus element kinds a fixed notation grammar wouldn't
//! have: chord symbols, roman numerals, and random-choice elements.

use super::Parser;
use crate::ast::{Bar, DurationClass, DurationSuffix, NoteStreamElement, PitchSpelling};
use crate::diagnostics::DiagnosticKind;
use crate::lexer::Token;

pub fn parse_note_stream(parser: &mut Parser) -> Vec<Bar> {
    parser.expect(&Token::Pipe);
    let mut bars = Vec::new();
    loop {
        let elements = parse_bar_elements(parser);
        bars.push(Bar { elements });
        if parser.check(&Token::Pipe) {
            parser.advance();
        } else {
            break;
        }
        if !starts_element(parser.peek()) {
            break;
        }
    }
    bars
}

fn parse_bar_elements(parser: &mut Parser) -> Vec<NoteStreamElement> {
    let mut elements = Vec::new();
    while !parser.check(&Token::Pipe) && !parser.at_eof() && starts_element(parser.peek()) {
        elements.push(parse_element(parser));
    }
    elements
}

fn starts_element(token: &Token) -> bool {
    matches!(
        token,
        Token::Underscore | Token::LBracket | Token::LParen | Token::NoteLit { .. } | Token::Identifier(_)
    )
}

fn parse_element(parser: &mut Parser) -> NoteStreamElement {
    match parser.peek().clone() {
        Token::Underscore => {
            parser.advance();
            NoteStreamElement::Rest { suffix: finish_suffix(parser, None) }
        }
        Token::LBracket => {
            parser.advance();
            let mut pitches = Vec::new();
            while !parser.check(&Token::RBracket) && !parser.at_eof() {
                match parse_plain_pitch(parser) {
                    Some(p) => pitches.push(p),
                    None => {
                        parser.advance();
                    }
                }
            }
            parser.expect(&Token::RBracket);
            NoteStreamElement::Chord { pitches, suffix: finish_suffix(parser, None) }
        }
        Token::LParen => parse_random_choice(parser),
        Token::NoteLit { letter, alteration, octave } => {
            parser.advance();
            let pitch = PitchSpelling { letter, alteration, octave };
            NoteStreamElement::Note { pitch, suffix: finish_suffix(parser, None) }
        }
        Token::Identifier(word) => parse_identifier_element(parser, word),
        _ => {
            // Unreachable under `starts_element`'s guard, but the parser
            // must still make progress rather than loop.
            parser.advance();
            NoteStreamElement::Rest { suffix: DurationSuffix::default() }
        }
    }
}

fn parse_identifier_element(parser: &mut Parser, word: String) -> NoteStreamElement {
    if let Some(tail) = word.strip_prefix('_') {
        if tail.len() == 1 && DurationClass::from_letter(tail.chars().next().unwrap()).is_some() {
            parser.advance();
            let class = DurationClass::from_letter(tail.chars().next().unwrap());
            return NoteStreamElement::Rest { suffix: finish_suffix(parser, class) };
        }
    }

    if is_roman_numeral(&word) {
        parser.advance();
        return NoteStreamElement::RomanNumeral { numeral: word, suffix: finish_suffix(parser, None) };
    }

    if let Some((pitch, tail)) = split_pitch_and_tail(&word) {
        if tail.is_empty() {
            parser.advance();
            return NoteStreamElement::Note { pitch, suffix: finish_suffix(parser, None) };
        }
        if tail.len() == 1 {
            if let Some(class) = DurationClass::from_letter(tail.chars().next().unwrap()) {
                parser.advance();
                return NoteStreamElement::Note { pitch, suffix: finish_suffix(parser, Some(class)) };
            }
        }
    }

    parser.advance();
    NoteStreamElement::ChordSymbol { symbol: word, suffix: finish_suffix(parser, None) }
}

fn parse_random_choice(parser: &mut Parser) -> NoteStreamElement {
    parser.advance(); // consume '('
    let reroll_each_repeat = if parser.check(&Token::DoubleQuestion) {
        parser.advance();
        true
    } else {
        parser.expect(&Token::Question);
        false
    };

    let mut choices = Vec::new();
    while !parser.check(&Token::RParen) && !parser.at_eof() {
        let elem = parse_element(parser);
        let weight = if parser.check(&Token::Colon) {
            parser.advance();
            match parser.peek().clone() {
                Token::IntLit(v) => {
                    parser.advance();
                    Some(v as f64)
                }
                Token::DoubleLit(v) => {
                    parser.advance();
                    Some(v)
                }
                _ => {
                    let loc = parser.location();
                    parser.diags.push(
                        DiagnosticKind::ParseMalformedMusicalLiteral("expected a weight after ':'".into()),
                        loc,
                    );
                    None
                }
            }
        } else {
            None
        };
        choices.push((Box::new(elem), weight));
        if parser.check(&Token::Comma) {
            parser.advance();
        }
    }
    parser.expect(&Token::RParen);
    NoteStreamElement::RandomChoice { reroll_each_repeat, choices }
}

fn parse_plain_pitch(parser: &mut Parser) -> Option<PitchSpelling> {
    match parser.peek().clone() {
        Token::NoteLit { letter, alteration, octave } => {
            parser.advance();
            Some(PitchSpelling { letter, alteration, octave })
        }
        Token::Identifier(word) => {
            let (pitch, tail) = split_pitch_and_tail(&word)?;
            if tail.is_empty() {
                parser.advance();
                Some(pitch)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn finish_suffix(parser: &mut Parser, class: Option<DurationClass>) -> DurationSuffix {
    let dotted = if parser.check(&Token::Dot) {
        parser.advance();
        true
    } else {
        false
    };
    let tied = if parser.check(&Token::Tilde) {
        parser.advance();
        true
    } else {
        false
    };
    let cent_offset = if let Token::CentLit(v) = parser.peek().clone() {
        parser.advance();
        Some(v.round() as i64)
    } else {
        None
    };
    DurationSuffix { class, dotted, tied, cent_offset }
}

/// Splits a pitch-letter word into its spelling and whatever follows
/// (empty, a single duration letter, or a chord-quality tail like
/// `"maj7"` that makes the word a chord symbol instead).
fn split_pitch_and_tail(word: &str) -> Option<(PitchSpelling, &str)> {
    let mut chars = word.chars();
    let letter = chars.next()?;
    if !('A'..='G').contains(&letter) {
        return None;
    }
    let rest = chars.as_str();
    let alt_len = rest.chars().take_while(|c| *c == 's' || *c == 'f').count();
    let (alt_part, after_alt) = rest.split_at(alt_len);
    let alteration: i8 = alt_part.chars().fold(0i8, |acc, c| acc + if c == 's' { 1 } else { -1 });

    let octave_len = after_alt.chars().take(1).filter(|c| c.is_ascii_digit()).count();
    let (octave_part, tail) = after_alt.split_at(octave_len);
    let octave = if octave_part.is_empty() { None } else { octave_part.parse::<i64>().ok() };

    Some((PitchSpelling { letter, alteration, octave }, tail))
}

fn is_roman_numeral(word: &str) -> bool {
    let body = word.strip_suffix('7').unwrap_or(word);
    !body.is_empty() && body.chars().all(|c| matches!(c, 'I' | 'V' | 'X' | 'i' | 'v' | 'x'))
}
