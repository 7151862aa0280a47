//! Clip dispatch for action transitions. The mixer itself lives behind
//! [`AnimationSink`]; this side only knows which handle belongs to which action.

use rapier3d::prelude::Real;

use crate::{ActionState, ActionTransition};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    Repeat,
    Once,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipPlayback {
    pub fade_in: Real,
    pub loop_mode: LoopMode,
    pub reversed: bool,
    /// Hold the last pose once a `Once` clip finishes.
    pub clamp_when_finished: bool,
}

impl ClipPlayback {
    /// Sit plays once in reverse and holds; everything else loops.
    pub fn for_action(action: ActionState, fade_in: Real) -> Self {
        match action {
            ActionState::Sit => Self {
                fade_in,
                loop_mode: LoopMode::Once,
                reversed: true,
                clamp_when_finished: true,
            },
            _ => Self {
                fade_in,
                loop_mode: LoopMode::Repeat,
                reversed: false,
                clamp_when_finished: false,
            },
        }
    }
}

pub trait AnimationSink {
    type Clip;

    fn fade_in(&mut self, clip: &Self::Clip, playback: ClipPlayback);
    fn fade_out(&mut self, clip: &Self::Clip, duration: Real);
    fn advance(&mut self, dt: Real);
}

/// Clip handles indexed by [`ActionState`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClipTable<H> {
    clips: [Option<H>; ActionState::COUNT],
}

impl<H> Default for ClipTable<H> {
    fn default() -> Self {
        Self {
            clips: std::array::from_fn(|_| None),
        }
    }
}

impl<H> ClipTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fn(mut clip: impl FnMut(ActionState) -> Option<H>) -> Self {
        Self {
            clips: std::array::from_fn(|index| clip(ActionState::ALL[index])),
        }
    }

    pub fn with(mut self, action: ActionState, handle: H) -> Self {
        self.insert(action, handle);
        self
    }

    pub fn insert(&mut self, action: ActionState, handle: H) -> Option<H> {
        self.clips[action.index()].replace(handle)
    }

    pub fn get(&self, action: ActionState) -> Option<&H> {
        self.clips[action.index()].as_ref()
    }

    pub fn missing(&self) -> impl Iterator<Item = ActionState> + '_ {
        ActionState::ALL
            .into_iter()
            .filter(|action| self.clips[action.index()].is_none())
    }
}

pub struct ActionAnimator<S: AnimationSink> {
    sink: S,
    clips: ClipTable<S::Clip>,
    blend_duration: Real,
}

impl<S: AnimationSink> ActionAnimator<S> {
    pub fn new(sink: S, clips: ClipTable<S::Clip>, blend_duration: Real) -> Self {
        for action in clips.missing() {
            log::debug!("no clip bound for {}", action.clip_name());
        }
        Self {
            sink,
            clips,
            blend_duration: blend_duration.max(0.0),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn clips(&self) -> &ClipTable<S::Clip> {
        &self.clips
    }

    pub fn blend_duration(&self) -> Real {
        self.blend_duration
    }

    pub fn set_blend_duration(&mut self, blend_duration: Real) {
        self.blend_duration = blend_duration.max(0.0);
    }

    /// Starts the clip for the initial action without a cross-fade.
    pub fn start(&mut self, action: ActionState) {
        if let Some(clip) = self.clips.get(action) {
            self.sink.fade_in(clip, ClipPlayback::for_action(action, 0.0));
        } else {
            log::debug!("no clip to start for {}", action.clip_name());
        }
    }

    pub fn apply(&mut self, transition: ActionTransition) {
        match self.clips.get(transition.from) {
            Some(clip) => self.sink.fade_out(clip, self.blend_duration),
            None => log::debug!("no clip to fade out for {}", transition.from.clip_name()),
        }
        match self.clips.get(transition.to) {
            Some(clip) => self.sink.fade_in(
                clip,
                ClipPlayback::for_action(transition.to, self.blend_duration),
            ),
            None => log::debug!("no clip to fade in for {}", transition.to.clip_name()),
        }
    }

    pub fn advance(&mut self, dt: Real) {
        self.sink.advance(dt);
    }
}

/// Sink that drops every command, for headless runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl AnimationSink for NullSink {
    type Clip = ();

    fn fade_in(&mut self, _clip: &(), _playback: ClipPlayback) {}
    fn fade_out(&mut self, _clip: &(), _duration: Real) {}
    fn advance(&mut self, _dt: Real) {}
}
