//! Answer and question order randomization.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::Question;

/// Shuffle the answers within every question, then the question order.
///
/// Both passes are uniform Fisher–Yates permutations drawn from `rng`.
pub fn shuffle_session<R: Rng + ?Sized>(questions: &mut [Question], rng: &mut R) {
    for question in questions.iter_mut() {
        question.answers.shuffle(rng);
    }
    questions.shuffle(rng);
}
