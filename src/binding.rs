use crate::renderer::SceneId;

/// Tracks which scene geometry and camera operations apply to.
///
/// Exactly one scene may be bound at a time. Code that needs to touch a
/// different scene mid-operation pushes the current binding aside with
/// [`store_and_bind`](Self::store_and_bind) and restores it afterwards;
/// nesting unwinds LIFO.
#[derive(Debug, Default)]
pub struct SceneBindingStack {
    current: Option<SceneId>,
    previous: Vec<SceneId>,
}

impl SceneBindingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<SceneId> {
        self.current
    }

    /// Makes `scene` current, discarding any existing binding. The stack of
    /// stored bindings is untouched.
    pub fn bind(&mut self, scene: SceneId) {
        self.current = Some(scene);
    }

    pub fn unbind(&mut self) {
        self.current = None;
    }

    /// Pushes the current binding (if any) and binds `scene` in its place.
    pub fn store_and_bind(&mut self, scene: SceneId) {
        if let Some(current) = self.current.take() {
            self.previous.push(current);
        }
        self.current = Some(scene);
    }

    /// Restores the most recently stored binding, or leaves nothing bound if
    /// the stack is empty.
    pub fn restore_and_unbind(&mut self) {
        self.current = self.previous.pop();
    }

    /// Drops every reference to `scene`, both current and stored. Called when
    /// a scene is deleted so the stack can never resurrect a dangling id.
    pub fn forget(&mut self, scene: SceneId) {
        if self.current == Some(scene) {
            self.current = None;
        }
        self.previous.retain(|&stored| stored != scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_replaces_without_stacking() {
        let mut stack = SceneBindingStack::new();
        stack.bind(SceneId(1));
        stack.bind(SceneId(2));
        assert_eq!(stack.current(), Some(SceneId(2)));
        stack.restore_and_unbind();
        assert_eq!(stack.current(), None);
    }

    #[test]
    fn store_and_bind_nests_lifo() {
        let mut stack = SceneBindingStack::new();
        stack.bind(SceneId(1));
        stack.store_and_bind(SceneId(2));
        stack.store_and_bind(SceneId(3));
        assert_eq!(stack.current(), Some(SceneId(3)));

        stack.restore_and_unbind();
        assert_eq!(stack.current(), Some(SceneId(2)));
        stack.restore_and_unbind();
        assert_eq!(stack.current(), Some(SceneId(1)));
        stack.restore_and_unbind();
        assert_eq!(stack.current(), None);
    }

    #[test]
    fn restore_on_empty_stack_unbinds() {
        let mut stack = SceneBindingStack::new();
        stack.bind(SceneId(5));
        stack.restore_and_unbind();
        assert_eq!(stack.current(), None);
        stack.restore_and_unbind();
        assert_eq!(stack.current(), None);
    }

    #[test]
    fn forget_scrubs_current_and_stored_references() {
        let mut stack = SceneBindingStack::new();
        stack.bind(SceneId(1));
        stack.store_and_bind(SceneId(2));
        stack.store_and_bind(SceneId(1));

        stack.forget(SceneId(1));
        assert_eq!(stack.current(), None);
        stack.restore_and_unbind();
        assert_eq!(stack.current(), Some(SceneId(2)));
    }
}
