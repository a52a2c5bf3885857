mod bubble;
pub mod postback;

pub use bubble::{hero_image, BubbleContent, Composer, MAX_CAROUSEL_BUBBLES};
pub use postback::{sanitize_postbacks, QuizAnswer};
