//! Stock bindings.

use super::{ActionId, InputGesture, Key, Swipe};

pub fn default_layout() -> Vec<(InputGesture, ActionId)> {
    vec![
        (InputGesture::Key(Key::ArrowLeft), ActionId::PrevPage),
        (InputGesture::Key(Key::ArrowRight), ActionId::NextPage),
        (InputGesture::Key(Key::Enter), ActionId::SubmitSearch),
        (InputGesture::Swipe(Swipe::Right), ActionId::PrevPage),
        (InputGesture::Swipe(Swipe::Left), ActionId::NextPage),
    ]
}
