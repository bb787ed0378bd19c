//! Actions a keybind can trigger.

use std::fmt;
use std::str::FromStr;

use crate::error::BindError;

/// A single keybind action.
///
/// Wall actions carry an optional zero-based target instance; `None`
/// means "the grid cell under the pointer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    IngameFocus,
    IngameReset,
    WallFocus,
    WallResetAll,
    WallPlayFirstLocked,
    WallPlay(Option<usize>),
    WallReset(Option<usize>),
    WallResetOthers(Option<usize>),
    WallLock(Option<usize>),
}

impl Action {
    pub fn is_wall(&self) -> bool {
        !matches!(self, Self::IngameFocus | Self::IngameReset)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::IngameFocus => "ingame_focus",
            Self::IngameReset => "ingame_reset",
            Self::WallFocus => "wall_focus",
            Self::WallResetAll => "wall_reset_all",
            Self::WallPlayFirstLocked => "wall_play_first_locked",
            Self::WallPlay(_) => "wall_play",
            Self::WallReset(_) => "wall_reset",
            Self::WallResetOthers(_) => "wall_reset_others",
            Self::WallLock(_) => "wall_lock",
        }
    }

    fn target(&self) -> Option<usize> {
        match self {
            Self::WallPlay(t) | Self::WallReset(t) | Self::WallResetOthers(t) | Self::WallLock(t) => *t,
            _ => None,
        }
    }
}

impl FromStr for Action {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, target) = match s.split_once('(') {
            Some((name, rest)) => {
                let raw = rest
                    .strip_suffix(')')
                    .ok_or_else(|| BindError::UnknownAction(s.to_string()))?;
                let n = raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| BindError::InvalidActionTarget {
                        action: name.to_string(),
                        value: raw.to_string(),
                    })?;
                (name.trim(), Some(n - 1))
            }
            None => (s, None),
        };
        let action = match name {
            "ingame_focus" => Self::IngameFocus,
            "ingame_reset" => Self::IngameReset,
            "wall_focus" => Self::WallFocus,
            "wall_reset_all" => Self::WallResetAll,
            "wall_play_first_locked" => Self::WallPlayFirstLocked,
            "wall_play" => Self::WallPlay(target),
            "wall_reset" => Self::WallReset(target),
            "wall_reset_others" => Self::WallResetOthers(target),
            "wall_lock" => Self::WallLock(target),
            _ => return Err(BindError::UnknownAction(s.to_string())),
        };
        if target.is_some() && action.target().is_none() {
            return Err(BindError::InvalidActionTarget {
                action: name.to_string(),
                value: s.to_string(),
            });
        }
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(t) => write!(f, "{}({})", self.name(), t + 1),
            None => f.write_str(self.name()),
        }
    }
}

/// Actions bound to one keybind, split by where they apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionList {
    pub ingame: Vec<Action>,
    pub wall: Vec<Action>,
}

impl ActionList {
    /// Parse the string lists from a profile. Ingame lists may only hold
    /// ingame actions and wall lists only wall actions.
    pub fn parse(ingame: &[String], wall: &[String]) -> Result<Self, BindError> {
        let ingame = ingame
            .iter()
            .map(|s| parse_scoped(s, false))
            .collect::<Result<Vec<_>, _>>()?;
        let wall = wall
            .iter()
            .map(|s| parse_scoped(s, true))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ingame, wall })
    }

    pub fn get(&self, on_wall: bool) -> &[Action] {
        if on_wall { &self.wall } else { &self.ingame }
    }
}

fn parse_scoped(s: &str, wall: bool) -> Result<Action, BindError> {
    let action: Action = s.parse()?;
    if action.is_wall() != wall {
        return Err(BindError::UnknownAction(s.to_string()));
    }
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets_as_zero_based() {
        assert_eq!("wall_play(3)".parse::<Action>().unwrap(), Action::WallPlay(Some(2)));
        assert_eq!("wall_lock".parse::<Action>().unwrap(), Action::WallLock(None));
        assert_eq!(
            "wall_reset_others( 1 )".parse::<Action>().unwrap(),
            Action::WallResetOthers(Some(0))
        );
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(matches!(
            "wall_play(0)".parse::<Action>(),
            Err(BindError::InvalidActionTarget { .. })
        ));
        assert!(matches!(
            "wall_reset_all(2)".parse::<Action>(),
            Err(BindError::InvalidActionTarget { .. })
        ));
        assert!(matches!(
            "wall_play(2".parse::<Action>(),
            Err(BindError::UnknownAction(_))
        ));
        assert!(matches!(
            "jump".parse::<Action>(),
            Err(BindError::UnknownAction(_))
        ));
    }

    #[test]
    fn display_uses_profile_syntax() {
        assert_eq!(Action::WallPlay(Some(0)).to_string(), "wall_play(1)");
        assert_eq!(Action::IngameReset.to_string(), "ingame_reset");
    }

    #[test]
    fn action_lists_are_scoped() {
        let list = ActionList::parse(
            &["ingame_reset".to_string()],
            &["wall_reset_all".to_string(), "wall_play(2)".to_string()],
        )
        .unwrap();
        assert_eq!(list.get(false), &[Action::IngameReset]);
        assert_eq!(list.get(true).len(), 2);

        assert!(ActionList::parse(&["wall_play".to_string()], &[]).is_err());
        assert!(ActionList::parse(&[], &["ingame_focus".to_string()]).is_err());
    }
}
