// controller.rs: rising-edge detection for the headset controller's two buttons

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerActions {
    pub primary_click: bool,
    pub menu_toggle: bool,
}

#[derive(Debug, Default)]
pub struct ControllerEdges {
    primary_down: bool,
    menu_down: bool,
}

impl ControllerEdges {
    /// Feed this frame's button levels; an action fires only on press.
    pub fn update(&mut self, primary_down: bool, menu_down: bool) -> ControllerActions {
        let actions = ControllerActions {
            primary_click: primary_down && !self.primary_down,
            menu_toggle: menu_down && !self.menu_down,
        };
        self.primary_down = primary_down;
        self.menu_down = menu_down;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_button_fires_once() {
        let mut edges = ControllerEdges::default();
        assert!(edges.update(true, false).primary_click);
        assert!(!edges.update(true, false).primary_click);
        assert!(!edges.update(false, false).primary_click);
        assert!(edges.update(true, false).primary_click);
    }

    #[test]
    fn buttons_are_independent() {
        let mut edges = ControllerEdges::default();
        let a = edges.update(true, true);
        assert_eq!(a, ControllerActions { primary_click: true, menu_toggle: true });
        let b = edges.update(false, true);
        assert_eq!(b, ControllerActions::default());
        let c = edges.update(true, false);
        assert_eq!(c, ControllerActions { primary_click: true, menu_toggle: false });
    }
}
