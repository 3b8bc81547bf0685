use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use super::{is_capitalized, is_stoplisted, CandidateSet};
use crate::types::{Category, ConfidenceTier};

const FIRST_NAMES: &[&str] = &[
    // Italian
    "alessandro", "alessandra", "alberto", "alessio", "andrea", "angela", "angelo", "anna",
    "antonella", "antonio", "barbara", "beatrice", "benedetta", "bruno", "camilla", "carla",
    "carlo", "carmela", "carmine", "caterina", "chiara", "claudia", "claudio", "cristina",
    "cristian", "daniela", "daniele", "davide", "domenico", "edoardo", "elena", "elisa",
    "emanuele", "emma", "enrico", "enzo", "fabio", "federica", "federico", "filippo", "flavio",
    "francesca", "francesco", "franco", "gabriele", "gabriella", "giacomo", "gianluca",
    "gianni", "giorgia", "giorgio", "giovanna", "giovanni", "giulia", "giuliano", "giulio",
    "giuseppe", "giuseppina", "grazia", "ilaria", "irene", "laura", "leonardo", "lorenzo",
    "luca", "lucia", "luciano", "luigi", "manuela", "marco", "margherita", "maria", "marina",
    "mario", "marta", "martina", "massimo", "matteo", "mattia", "maurizio", "michela",
    "michele", "monica", "nicola", "nicoletta", "paola", "paolo", "pasquale", "patrizia",
    "pietro", "raffaele", "raffaella", "riccardo", "roberta", "roberto", "rosa", "rosanna",
    "salvatore", "sara", "serena", "sergio", "silvia", "simona", "simone", "sofia", "stefania",
    "stefano", "teresa", "tommaso", "valentina", "valerio", "vincenzo", "vittoria", "vittorio",
    // English
    "james", "john", "robert", "michael", "william", "david", "richard", "joseph", "thomas",
    "charles", "christopher", "daniel", "matthew", "anthony", "mark", "donald", "steven",
    "paul", "andrew", "joshua", "kenneth", "kevin", "brian", "george", "edward", "peter",
    "mary", "patricia", "jennifer", "linda", "elizabeth", "susan", "jessica", "sarah", "karen",
    "nancy", "lisa", "betty", "margaret", "sandra", "ashley", "emily", "michelle", "amanda",
    "melissa", "rebecca", "laura", "helen", "alice", "olivia", "jane", "emma", "lucy",
];

const SURNAMES: &[&str] = &[
    // Italian
    "rossi", "russo", "ferrari", "esposito", "bianchi", "romano", "colombo", "ricci", "marino",
    "greco", "bruno", "gallo", "conti", "de luca", "costa", "giordano", "mancini", "rizzo",
    "lombardi", "moretti", "barbieri", "fontana", "santoro", "mariani", "rinaldi", "caruso",
    "ferrara", "galli", "martini", "leone", "longo", "gentile", "martinelli", "vitale",
    "lombardo", "serra", "coppola", "de santis", "d'angelo", "marchetti", "parisi", "villa",
    "conte", "ferraro", "ferri", "fabbri", "bianco", "marini", "grasso", "valentini",
    "messina", "sala", "de angelis", "gatti", "pellegrini", "palumbo", "sanna", "farina",
    "rizzi", "monti", "cattaneo", "morelli", "amato", "silvestri", "mazza", "testa", "grassi",
    "pellegrino", "carbone", "giuliani", "benedetti", "barone", "rossetti", "caputo",
    "montanari", "guerra", "palmieri", "bernardi", "martino", "fiore", "de rosa", "ferretti",
    "bellini", "basile", "riva", "donati", "piras", "vitali", "battaglia", "sartori", "neri",
    "costantini", "milani", "pagano", "ruggiero", "sorrentino", "d'amico", "orlando", "damico",
    "negri", "verdi", "santis", "angelis", "luca",
    // English
    "smith", "johnson", "williams", "brown", "jones", "garcia", "miller", "davis", "wilson",
    "anderson", "taylor", "thomas", "moore", "jackson", "martin", "lee", "thompson", "white",
    "harris", "clark", "lewis", "robinson", "walker", "young", "allen", "king", "wright",
    "scott", "green", "baker", "adams", "nelson", "hill", "campbell", "mitchell", "roberts",
    "carter", "phillips", "evans", "turner", "parker", "collins", "edwards", "stewart", "doe",
];

lazy_static! {
    static ref FIRST_NAME_SET: HashSet<&'static str> = FIRST_NAMES.iter().copied().collect();
    static ref SURNAME_SET: HashSet<&'static str> = SURNAMES.iter().copied().collect();

    static ref WORD_REGEX: Regex = Regex::new(r"\p{L}[\p{L}'’\-]*").unwrap();
}

pub fn is_known_first_name(word: &str) -> bool {
    FIRST_NAME_SET.contains(word.to_lowercase().as_str())
}

pub fn is_known_surname(word: &str) -> bool {
    SURNAME_SET.contains(word.to_lowercase().as_str())
}

/// Cross-reference adjacent capitalized word pairs against the name lists.
///
/// Both words known: HIGH. One: MEDIUM. Neither: LOW. Surname-first order
/// ("Rossi Mario") counts the same as given-name-first.
pub(super) fn scan_dictionary(text: &str, set: &mut CandidateSet<'_>) {
    let words: Vec<_> = WORD_REGEX
        .find_iter(text)
        .filter(|m| is_standalone(text, m.start(), m.end()))
        .collect();

    for pair in words.windows(2) {
        let (first, second) = (pair[0], pair[1]);

        let gap = &text[first.end()..second.start()];
        if gap.is_empty() || !gap.chars().all(|c| c == ' ' || c == '\t') {
            continue;
        }
        if !is_name_word(first.as_str()) || !is_name_word(second.as_str()) {
            continue;
        }
        if is_stoplisted(first.as_str()) || is_stoplisted(second.as_str()) {
            continue;
        }

        let given_first = is_known_first_name(first.as_str()) as u8 + is_known_surname(second.as_str()) as u8;
        let surname_first = is_known_surname(first.as_str()) as u8 + is_known_first_name(second.as_str()) as u8;
        let confidence = match given_first.max(surname_first) {
            2 => ConfidenceTier::High,
            1 => ConfidenceTier::Medium,
            _ => ConfidenceTier::Low,
        };

        set.offer(
            &text[first.start()..second.end()],
            Category::FullName,
            confidence,
            first.start(),
        );
    }
}

/// Title-case word of at least two letters.
fn is_name_word(word: &str) -> bool {
    is_capitalized(word)
        && word.chars().count() >= 2
        && word.chars().skip(1).any(|c| c.is_lowercase())
}

/// Not glued to digits or other word characters ("MRSRSS85...").
fn is_standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_alphanumeric() || c == '_')
        && !after.is_some_and(|c| c.is_alphanumeric() || c == '_')
}
