//! Viseme and phoneme label tables
//!
//! The classifier works on a closed set of 15 Oculus-style mouth shapes.
//! Phoneme identity is metadata only: many phonemes map to one viseme, and
//! the binary model stores phoneme labels as indices into a label table
//! shared between encoder and decoder.

/// Canonical viseme names, in index order. Index 14 is silence/neutral.
pub const VISEMES: [&str; 15] = [
    "aa", "E", "I", "O", "U", "PP", "SS", "TH", "DD", "FF", "kk", "nn", "RR", "CH", "sil",
];

/// Reserved silence/neutral viseme class.
pub const VISEME_SIL: u8 = 14;

/// Label used for the synthetic silence training class.
pub const SILENCE_LABEL: &str = "s1";

/// IPA symbol to viseme name, grouped by mouth shape.
const IPA_TO_VISEME: &[(&str, &str)] = &[
    // Silence / pause markers
    ("", "sil"),
    ("ˈ", "sil"),
    ("ˌ", "sil"),
    ("‖", "sil"),
    ("|", "sil"),
    // Plosives / bilabials
    ("p", "PP"),
    ("b", "PP"),
    ("m", "PP"),
    // Labiodentals
    ("f", "FF"),
    ("v", "FF"),
    // Dentals
    ("θ", "TH"),
    ("ð", "TH"),
    // Alveolar stops
    ("t", "DD"),
    ("d", "DD"),
    // Velar stops
    ("k", "kk"),
    ("g", "kk"),
    ("q", "kk"),
    ("ɢ", "kk"),
    // Affricates
    ("tʃ", "CH"),
    ("dʒ", "CH"),
    ("ts", "CH"),
    ("dz", "CH"),
    // Fricatives / sibilants
    ("s", "SS"),
    ("z", "SS"),
    ("ʃ", "SS"),
    ("ʒ", "SS"),
    ("ɕ", "SS"),
    ("ʑ", "SS"),
    ("ç", "SS"),
    ("ʝ", "SS"),
    ("x", "SS"),
    ("ɣ", "SS"),
    ("h", "SS"),
    // Nasals
    ("n", "nn"),
    ("ŋ", "nn"),
    ("ɲ", "nn"),
    ("ɳ", "nn"),
    ("m̩", "nn"),
    // Liquids / approximants
    ("ɹ", "RR"),
    ("r", "RR"),
    ("ɾ", "RR"),
    ("ɽ", "RR"),
    ("l", "RR"),
    ("ɫ", "RR"),
    ("j", "RR"),
    ("w", "RR"),
    // Open / low vowels
    ("a", "aa"),
    ("aː", "aa"),
    ("ɑ", "aa"),
    ("ɑː", "aa"),
    ("ɐ", "aa"),
    ("aɪ", "aa"),
    ("aʊ", "aa"),
    ("ä", "aa"),
    // Mid vowels
    ("ɛ", "E"),
    ("ɛː", "E"),
    ("e", "E"),
    ("eː", "E"),
    ("eɪ", "E"),
    ("œ", "E"),
    ("ɜ", "E"),
    ("ʌ", "E"),
    // Close front vowels
    ("i", "I"),
    ("iː", "I"),
    ("ɪ", "I"),
    ("ɨ", "I"),
    ("y", "I"),
    ("yː", "I"),
    ("ʏ", "I"),
    // Mid back vowels
    ("o", "O"),
    ("oː", "O"),
    ("ɔ", "O"),
    ("ɔː", "O"),
    ("ɒ", "O"),
    ("ø", "O"),
    ("øː", "O"),
    // Close back vowels
    ("u", "U"),
    ("uː", "U"),
    ("ʊ", "U"),
    ("ɯ", "U"),
    ("ɯː", "U"),
    ("ɤ", "U"),
    // Central vowels
    ("ə", "E"),
    ("ɚ", "E"),
    ("ɘ", "E"),
];

/// Look up a viseme class by name.
pub fn viseme_id(name: &str) -> Option<u8> {
    VISEMES.iter().position(|&v| v == name).map(|i| i as u8)
}

/// Map an IPA symbol to its viseme class. Unknown symbols map to silence.
pub fn viseme_for_ipa(symbol: &str) -> u8 {
    IPA_TO_VISEME
        .iter()
        .find(|(ipa, _)| *ipa == symbol)
        .and_then(|(_, name)| viseme_id(name))
        .unwrap_or(VISEME_SIL)
}

/// Ordered phoneme label table shared by the model codec.
///
/// Record files store labels as indices into this table, so producer and
/// consumer must agree on it the same way they agree on the feature
/// dimension. The default table holds every IPA symbol of the built-in
/// mapping, the viseme names themselves (used when span data carries no
/// phoneme), and the synthetic silence label.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Build a table from an explicit label list.
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Index of a label, if present.
    pub fn id(&self, label: &str) -> Option<u32> {
        self.labels.iter().position(|l| l == label).map(|i| i as u32)
    }

    /// Label for an index, if in range.
    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        let mut labels: Vec<String> = IPA_TO_VISEME.iter().map(|(ipa, _)| ipa.to_string()).collect();
        labels.extend(VISEMES.iter().map(|v| v.to_string()));
        labels.push(SILENCE_LABEL.to_string());
        Self { labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viseme_order() {
        assert_eq!(VISEMES.len(), 15);
        assert_eq!(VISEMES[VISEME_SIL as usize], "sil");
        assert_eq!(viseme_id("aa"), Some(0));
        assert_eq!(viseme_id("CH"), Some(13));
        assert_eq!(viseme_id("xx"), None);
    }

    #[test]
    fn test_ipa_mapping() {
        assert_eq!(viseme_for_ipa("p"), viseme_id("PP").unwrap());
        assert_eq!(viseme_for_ipa("aɪ"), viseme_id("aa").unwrap());
        assert_eq!(viseme_for_ipa("ə"), viseme_id("E").unwrap());
        assert_eq!(viseme_for_ipa(""), VISEME_SIL);
    }

    #[test]
    fn test_unknown_ipa_maps_to_silence() {
        assert_eq!(viseme_for_ipa("💥"), VISEME_SIL);
    }

    #[test]
    fn test_label_table_round_trip() {
        let table = LabelTable::default();
        assert!(!table.is_empty());

        let id = table.id(SILENCE_LABEL).expect("silence label present");
        assert_eq!(table.label(id), Some(SILENCE_LABEL));

        // Every IPA symbol resolves both ways
        let id = table.id("tʃ").unwrap();
        assert_eq!(table.label(id), Some("tʃ"));

        assert_eq!(table.id("not-a-phoneme"), None);
        assert_eq!(table.label(u32::MAX), None);
    }

    #[test]
    fn test_custom_table() {
        let table = LabelTable::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.id("b"), Some(1));
        assert_eq!(table.label(2), None);
    }
}
