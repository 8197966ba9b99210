//! Keyword rules mapping the root subjects of a subject and an object to a
//! likely diagram category, used when no stored triple matches a query.

pub const FOOD_CHAINS_WEBS: &str = "foodChainsWebs";
pub const LIFE_CYCLES: &str = "lifeCycles";
pub const PARTS_OF_THE_EARTH: &str = "partsOfTheEarth";

/// Apply the rules in order; the first that fires wins.
///
/// | subject root        | object root         | category            |
/// |---------------------|---------------------|---------------------|
/// | `insect` / `animal` | `plant` / `flower`  | `foodChainsWebs`    |
/// | `animal`            | `animal`            | `foodChainsWebs`    |
/// | `plant`             | `plant`             | `lifeCycles`        |
/// | either contains `earth`                   || `partsOfTheEarth`   |
pub fn infer_category(subject_root: &str, object_root: &str) -> Option<&'static str> {
  let subject = subject_root.to_lowercase();
  let object = object_root.to_lowercase();
  let has = |s: &str, words: &[&str]| words.iter().any(|w| s.contains(w));

  if has(&subject, &["insect", "animal"]) && has(&object, &["plant", "flower"]) {
    Some(FOOD_CHAINS_WEBS)
  } else if subject.contains("animal") && object.contains("animal") {
    Some(FOOD_CHAINS_WEBS)
  } else if subject.contains("plant") && object.contains("plant") {
    Some(LIFE_CYCLES)
  } else if subject.contains("earth") || object.contains("earth") {
    Some(PARTS_OF_THE_EARTH)
  } else {
    None
  }
}
