//! Clip arena owned by the controller
//!
//! The clip list is created once per run from configuration. Only the
//! timing fields and the resolved handle of an entry change afterwards, and
//! every such change bumps the generation counter.

use common::{ClipStatus, TransitionRule};

use crate::config::ClipConfig;
use crate::resolver::ClipHandle;

/// One clip: where it comes from, what follows it, and its runtime timing
#[derive(Debug, Clone)]
pub struct ClipDescriptor {
    pub rule: TransitionRule,
    pub source: String,
    pub handle: Option<ClipHandle>,
    pub started_at_ms: u64,
    /// Known once the surface reports metadata
    pub duration_ms: Option<u64>,
}

impl ClipDescriptor {
    pub fn new(rule: TransitionRule, source: impl Into<String>) -> Self {
        Self {
            rule,
            source: source.into(),
            handle: None,
            started_at_ms: 0,
            duration_ms: None,
        }
    }

    pub fn status(&self) -> ClipStatus {
        ClipStatus {
            source: self.source.clone(),
            rule: self.rule,
            resolved: self.handle.is_some(),
            duration_ms: self.duration_ms,
        }
    }
}

impl From<&ClipConfig> for ClipDescriptor {
    fn from(config: &ClipConfig) -> Self {
        Self::new(config.rule, config.source.clone())
    }
}

/// Ordered clips plus the index of the active one
#[derive(Debug, Default)]
pub struct SequenceState {
    clips: Vec<ClipDescriptor>,
    active_index: usize,
    generation: u64,
}

impl SequenceState {
    pub fn new(clips: Vec<ClipDescriptor>) -> Self {
        Self {
            clips,
            active_index: 0,
            generation: 0,
        }
    }

    pub fn from_config(clips: &[ClipConfig]) -> Self {
        Self::new(clips.iter().map(ClipDescriptor::from).collect())
    }

    /// Replace the clip list for a new run; the generation keeps counting
    pub fn reset(&mut self, clips: &[ClipConfig]) {
        self.clips = clips.iter().map(ClipDescriptor::from).collect();
        self.active_index = 0;
        self.generation += 1;
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clips(&self) -> &[ClipDescriptor] {
        &self.clips
    }

    pub fn get(&self, index: usize) -> Option<&ClipDescriptor> {
        self.clips.get(index)
    }

    pub fn active(&self) -> Option<&ClipDescriptor> {
        self.clips.get(self.active_index)
    }

    /// Mutable access to the active clip; counts as a mutation
    pub fn active_mut(&mut self) -> Option<&mut ClipDescriptor> {
        let clip = self.clips.get_mut(self.active_index)?;
        self.generation += 1;
        Some(clip)
    }

    /// Make `index` the active clip and reset its start time
    ///
    /// Returns `false` without changing anything when `index` is out of range.
    pub fn enter(&mut self, index: usize) -> bool {
        let Some(clip) = self.clips.get_mut(index) else {
            return false;
        };
        clip.started_at_ms = 0;
        self.active_index = index;
        self.generation += 1;
        true
    }

    /// Index the given rule moves to from the active clip, `None` when it leaves the list
    pub fn next_index(&self, rule: TransitionRule) -> Option<usize> {
        let index = match rule {
            TransitionRule::Next => self.active_index.checked_add(1)?,
            TransitionRule::Current => self.active_index,
            TransitionRule::Previous => self.active_index.checked_sub(1)?,
        };
        (index < self.clips.len()).then_some(index)
    }

    /// Attach resolved handles in list order
    pub fn attach_handles(&mut self, handles: Vec<ClipHandle>) -> anyhow::Result<()> {
        if handles.len() != self.clips.len() {
            anyhow::bail!(
                "resolver returned {} handle(s) for {} clip(s)",
                handles.len(),
                self.clips.len()
            );
        }

        for (clip, handle) in self.clips.iter_mut().zip(handles) {
            clip.handle = Some(handle);
        }
        self.generation += 1;
        Ok(())
    }

    /// Drop every resolved handle, deleting materialized files no one else holds
    pub fn release_handles(&mut self) -> usize {
        let mut released = 0;
        for clip in &mut self.clips {
            if clip.handle.take().is_some() {
                released += 1;
            }
        }
        if released > 0 {
            self.generation += 1;
        }
        released
    }

    pub fn status(&self) -> Vec<ClipStatus> {
        self.clips.iter().map(ClipDescriptor::status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sequence(rules: &[TransitionRule]) -> SequenceState {
        SequenceState::new(
            rules
                .iter()
                .enumerate()
                .map(|(i, rule)| ClipDescriptor::new(*rule, format!("clip{}.mp4", i)))
                .collect(),
        )
    }

    #[test]
    fn test_next_index_rules() {
        use TransitionRule::*;
        let mut seq = sequence(&[Next, Current, Previous]);

        assert_eq!(seq.next_index(Next), Some(1));
        assert_eq!(seq.next_index(Current), Some(0));
        assert_eq!(seq.next_index(Previous), None);

        assert!(seq.enter(2));
        assert_eq!(seq.next_index(Next), None);
        assert_eq!(seq.next_index(Previous), Some(1));
        assert_eq!(seq.next_index(Current), Some(2));
    }

    #[test]
    fn test_next_index_on_empty_sequence() {
        let seq = SequenceState::default();
        assert_eq!(seq.next_index(TransitionRule::Current), None);
        assert_eq!(seq.next_index(TransitionRule::Next), None);
    }

    #[test]
    fn test_enter_resets_start_and_bumps_generation() {
        let mut seq = sequence(&[TransitionRule::Next, TransitionRule::Next]);
        seq.active_mut().unwrap().started_at_ms = 500;
        let before = seq.generation();

        assert!(seq.enter(0));
        assert_eq!(seq.active().unwrap().started_at_ms, 0);
        assert!(seq.generation() > before);

        let before = seq.generation();
        assert!(!seq.enter(7));
        assert_eq!(seq.generation(), before);
        assert_eq!(seq.active_index(), 0);
    }

    #[test]
    fn test_reset_rewinds_and_keeps_counting() {
        let mut seq = sequence(&[TransitionRule::Next, TransitionRule::Next]);
        seq.enter(1);
        let before = seq.generation();

        seq.reset(&[ClipConfig {
            rule: TransitionRule::Current,
            source: "loop.mp4".to_string(),
        }]);
        assert_eq!(seq.clips().len(), 1);
        assert_eq!(seq.active_index(), 0);
        assert_eq!(seq.active().unwrap().rule, TransitionRule::Current);
        assert!(seq.generation() > before);
    }

    #[test]
    fn test_attach_and_release_handles() {
        let mut seq = sequence(&[TransitionRule::Next, TransitionRule::Next]);
        let handles = vec![
            ClipHandle::local("a.mp4", PathBuf::from("/tmp/a.mp4")),
            ClipHandle::local("b.mp4", PathBuf::from("/tmp/b.mp4")),
        ];

        assert!(seq.attach_handles(handles[..1].to_vec()).is_err());
        seq.attach_handles(handles).unwrap();
        assert!(seq.status().iter().all(|clip| clip.resolved));

        assert_eq!(seq.release_handles(), 2);
        assert_eq!(seq.release_handles(), 0);
        assert!(seq.status().iter().all(|clip| !clip.resolved));
    }
}
