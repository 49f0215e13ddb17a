use lazy_static::lazy_static;
use std::collections::HashSet;

use crate::ensemble::model::InferenceError;
use shared::{CategoryScore, EnsembleDecision, ModelPrediction, SpeciesCategory};

const PRIMARY_WEIGHT: f32 = 1.5;
const SECONDARY_WEIGHT: f32 = 1.0;
const RANK_DECAY: f32 = 0.2;

lazy_static! {
    // High-confidence plant keywords, weighted higher in scoring.
    static ref PLANT_PRIMARY: HashSet<&'static str> = [
        "plant", "flower", "tree", "leaf", "leaves", "blossom", "petal",
        "vegetable", "fruit", "shrub", "bush", "herb", "succulent", "cactus",
        "fern", "moss", "seaweed", "grass", "grain", "cereal", "legume",
    ]
    .into_iter()
    .collect();

    static ref PLANT_SECONDARY: HashSet<&'static str> = [
        "orchid", "rose", "daisy", "tulip", "sunflower", "lily", "iris", "lotus",
        "cabbage", "carrot", "potato", "tomato", "lettuce", "spinach", "broccoli",
        "banana", "apple", "orange", "grape", "strawberry", "blueberry", "raspberry",
        "corn", "wheat", "rice", "barley", "oats", "pine", "oak", "maple", "birch",
        "palm", "bamboo", "willow", "spruce", "elm", "ash", "beech",
        "ivy", "vine", "climbing", "weed", "lichen", "fungus", "mushroom", "toadstool",
    ]
    .into_iter()
    .collect();

    static ref ANIMAL_PRIMARY: HashSet<&'static str> = [
        "dog", "cat", "bird", "fish", "mammal", "insect", "animal",
        "horse", "cow", "sheep", "pig", "monkey", "bear", "lion", "tiger",
        "snake", "lizard", "frog", "turtle", "beetle", "butterfly", "ant", "bee",
    ]
    .into_iter()
    .collect();

    static ref ANIMAL_SECONDARY: HashSet<&'static str> = [
        "puppy", "kitten", "spider", "squirrel", "rabbit", "deer", "wolf", "fox",
        "whale", "dolphin", "shark", "eagle", "owl", "duck", "goose", "penguin",
        "zebra", "giraffe", "elephant", "rhinoceros", "hippopotamus", "otter", "seal",
        "dragonfly", "cricket", "grasshopper", "moth", "wasp", "fly", "mosquito",
        "termite", "snail", "crab", "lobster", "shrimp", "scorpion", "worm",
    ]
    .into_iter()
    .collect();
}

fn matches_any(text: &str, keywords: &HashSet<&'static str>) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// True when the text mentions any plant keyword, either tier. The router
/// uses this to trigger the post-hoc plant re-route.
pub fn mentions_plant(text: &str) -> bool {
    let text = text.to_lowercase();
    matches_any(&text, &PLANT_PRIMARY) || matches_any(&text, &PLANT_SECONDARY)
}

/// Accumulates plant/animal evidence over one model's top-K predictions.
/// A label matching both vocabularies contributes to both sides; that
/// ambiguity is resolved later by the aggregate, not here.
pub fn score(predictions: &[ModelPrediction]) -> CategoryScore {
    let mut result = CategoryScore::default();

    for (rank, prediction) in predictions.iter().enumerate() {
        let rank_weight = (1.0 - rank as f32 * RANK_DECAY).max(0.0);
        if rank_weight == 0.0 {
            break;
        }
        let text = prediction.label.to_lowercase();
        let base = prediction.probability * rank_weight;

        if matches_any(&text, &PLANT_PRIMARY) {
            result.plant_score += base * PRIMARY_WEIGHT;
        } else if matches_any(&text, &PLANT_SECONDARY) {
            result.plant_score += base * SECONDARY_WEIGHT;
        }

        if matches_any(&text, &ANIMAL_PRIMARY) {
            result.animal_score += base * PRIMARY_WEIGHT;
        } else if matches_any(&text, &ANIMAL_SECONDARY) {
            result.animal_score += base * SECONDARY_WEIGHT;
        }
    }

    result
}

/// Combines per-model evidence into one decision. Scores are averaged over
/// the models that reported, normalized to a plant share, and ties resolve
/// to `Plant` (`plant_norm >= 0.5`).
pub fn aggregate(scores: &[CategoryScore]) -> Result<EnsembleDecision, InferenceError> {
    if scores.is_empty() {
        return Err(InferenceError::NoScoresAvailable);
    }

    let count = scores.len() as f32;
    let avg_plant: f32 = scores.iter().map(|s| s.plant_score).sum::<f32>() / count;
    let avg_animal: f32 = scores.iter().map(|s| s.animal_score).sum::<f32>() / count;

    let total = avg_plant + avg_animal;
    let plant_norm = if total > 0.0 { avg_plant / total } else { 0.5 };

    let category = if plant_norm >= 0.5 {
        SpeciesCategory::Plant
    } else {
        SpeciesCategory::Animal
    };

    Ok(EnsembleDecision {
        category,
        confidence: plant_norm.max(1.0 - plant_norm),
        per_model_scores: scores.to_vec(),
    })
}
