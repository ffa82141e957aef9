//! Lua runtime core implementation.
//!
//! This module contains the `LuaRuntime` struct which owns the Lua state,
//! builds the `engine` table and drives the script entry points the host
//! calls each frame. Any error escaping an entry point is handled by the
//! runtime's [`ErrorPolicy`].

use std::cell::RefCell;
use std::rc::Rc;

use log::{error, info, warn};
use mlua::AppDataRef;
use mlua::prelude::*;

use super::bridge::{install, unwrap_node};
use super::commands::AssetCmd;
use super::pickle::{pickle, unpickle};
use crate::error::ScriptRuntimeError;
use crate::events::pointer::{PointerEvent, PointerEventKind, PointerRouter};
use crate::objects::ObjectType;
use crate::scene::node::SceneNode;
use crate::scene::render::RenderContext;

/// Shared state accessible from Lua function closures.
/// This is stored in Lua's app_data so engine functions can reach it.
pub(super) struct LuaAppData {
    pub(super) asset_commands: RefCell<Vec<AssetCmd>>,
    /// Root drawn and fed input when no script hooks are defined.
    pub(super) stage: RefCell<Option<Rc<SceneNode>>>,
    pub(super) router: PointerRouter,
}

pub(super) fn app_data(lua: &Lua) -> LuaResult<AppDataRef<'_, LuaAppData>> {
    lua.app_data_ref::<LuaAppData>()
        .ok_or_else(|| LuaError::runtime("LuaAppData not found"))
}

/// What happens when a script error escapes an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the error and suspend until [`LuaRuntime::reset`].
    #[default]
    Development,
    /// Log the error and abort the process.
    Production,
}

/// Where the main chunk came from, so a reset can run it again.
#[derive(Debug, Clone)]
enum MainChunk {
    File(String),
    Source { name: String, source: String },
}

/// Resource holding the Lua interpreter state.
///
/// This is a `NonSend` resource because the Lua state is not thread-safe.
pub struct LuaRuntime {
    lua: Lua,
    policy: ErrorPolicy,
    main: Option<MainChunk>,
    suspended: bool,
    last_error: Option<ScriptRuntimeError>,
}

impl LuaRuntime {
    /// Creates a new Lua runtime and registers the full engine API.
    ///
    /// # Errors
    ///
    /// Returns an error if Lua initialization or API registration fails.
    pub fn new(policy: ErrorPolicy) -> LuaResult<Self> {
        let lua = Lua::new();

        // Set up the package path so `require` can find scripts next to main
        lua.load(r#"package.path = "./scripts/?.lua;./scripts/?/init.lua;" .. package.path"#)
            .exec()?;

        lua.set_app_data(LuaAppData {
            asset_commands: RefCell::new(Vec::new()),
            stage: RefCell::new(None),
            router: PointerRouter::new(),
        });
        install(&lua)?;

        let runtime = Self {
            lua,
            policy,
            main: None,
            suspended: false,
            last_error: None,
        };
        runtime.register_base_api()?;
        runtime.register_scene_api()?;
        runtime.register_event_api()?;
        runtime.register_physics_api()?;

        Ok(runtime)
    }

    /// Registers the base `engine` table with logging functions and state.
    fn register_base_api(&self) -> LuaResult<()> {
        let engine = self.lua.create_table()?;

        // engine.log(message) - General purpose logging
        engine.set(
            "log",
            self.lua.create_function(|_, msg: String| {
                info!(target: "lua", "{}", msg);
                Ok(())
            })?,
        )?;

        // engine.log_info(message) - Info level logging
        engine.set(
            "log_info",
            self.lua.create_function(|_, msg: String| {
                info!(target: "lua", "{}", msg);
                Ok(())
            })?,
        )?;

        // engine.log_warn(message) - Warning level logging
        engine.set(
            "log_warn",
            self.lua.create_function(|_, msg: String| {
                warn!(target: "lua", "{}", msg);
                Ok(())
            })?,
        )?;

        // engine.log_error(message) - Error level logging
        engine.set(
            "log_error",
            self.lua.create_function(|_, msg: String| {
                error!(target: "lua", "{}", msg);
                Ok(())
            })?,
        )?;

        // engine.state survives resets and is written to the state file on exit
        engine.set("state", self.lua.create_table()?)?;

        self.lua.globals().set("engine", engine)?;

        Ok(())
    }

    /// Reads and runs the main script, remembering it for [`reset`](Self::reset).
    ///
    /// Returns false if the script failed; the failure is handled by the
    /// error policy.
    pub fn run_main(&mut self, path: &str) -> bool {
        info!("Running main script {}", path);
        let chunk = MainChunk::File(path.to_string());
        self.main = Some(chunk.clone());
        self.run_main_chunk(&chunk)
    }

    /// Runs `source` as the main chunk under `name`.
    pub fn run_main_source(&mut self, name: &str, source: &str) -> bool {
        let chunk = MainChunk::Source {
            name: name.to_string(),
            source: source.to_string(),
        };
        self.main = Some(chunk.clone());
        self.run_main_chunk(&chunk)
    }

    fn run_main_chunk(&mut self, chunk: &MainChunk) -> bool {
        self.guarded("main", |rt| match chunk {
            MainChunk::File(path) => rt.run_script(path),
            MainChunk::Source { name, source } => rt.lua.load(source.as_str()).set_name(name).exec(),
        })
        .is_some()
    }

    /// Executes a Lua script file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the script has syntax/runtime errors.
    pub fn run_script(&self, path: &str) -> LuaResult<()> {
        let script = std::fs::read_to_string(path)
            .map_err(|e| LuaError::ExternalError(std::sync::Arc::new(e)))?;
        self.lua.load(&script).set_name(path).exec()
    }

    /// Advances scripts by `dt` seconds through the `on_advance` hook.
    pub fn advance(&mut self, dt: f32) {
        self.guarded("advance", |rt| rt.call_hook::<_, ()>("on_advance", dt).map(|_| ()));
    }

    /// Draws a frame.
    ///
    /// With an `on_render` hook the script decides what to draw through
    /// `engine.draw(node)`, which only exists while the hook runs. Without
    /// one the stage is drawn.
    pub fn render(&mut self, ctx: &mut dyn RenderContext) {
        self.guarded("render", |rt| rt.render_frame(ctx));
    }

    fn render_frame(&self, ctx: &mut dyn RenderContext) -> LuaResult<()> {
        let Ok(on_render) = self.lua.globals().get::<LuaFunction>("on_render") else {
            if let Some(stage) = self.stage() {
                stage.draw(ctx);
            }
            return Ok(());
        };
        let engine: LuaTable = self.lua.globals().get("engine")?;
        self.lua.scope(|scope| {
            let draw = scope.create_function_mut(move |_, node: LuaValue| {
                unwrap_node(&node, ObjectType::SceneNode)?.draw(&mut *ctx);
                Ok(())
            })?;
            engine.set("draw", draw)?;
            let result = on_render.call::<()>(());
            engine.set("draw", LuaValue::Nil)?;
            result
        })
    }

    /// Feeds a pointer event to the scripts.
    ///
    /// The matching `on_pointer_down/up/move(id, x, y)` hook runs when
    /// defined; otherwise the event propagates through the stage. Returns
    /// whether the event was consumed.
    pub fn pointer_event(&mut self, event: &PointerEvent) -> bool {
        let hook = match event.kind {
            PointerEventKind::Down => "on_pointer_down",
            PointerEventKind::Up => "on_pointer_up",
            PointerEventKind::Move => "on_pointer_move",
        };
        self.guarded("pointer", |rt| {
            if let Some(result) =
                rt.call_hook::<_, LuaValue>(hook, (event.input_id, event.x, event.y))?
            {
                return Ok(!matches!(result, LuaValue::Boolean(false)));
            }
            match rt.stage() {
                Some(stage) => super::event_api::dispatch_pointer(&rt.lua, &stage, event),
                None => Ok(false),
            }
        })
        .unwrap_or(false)
    }

    /// Calls `on_key_down(key)` if defined.
    pub fn key_down(&mut self, key: &str) {
        self.guarded("key", |rt| rt.call_hook::<_, ()>("on_key_down", key).map(|_| ()));
    }

    /// Calls `on_key_up(key)` if defined.
    pub fn key_up(&mut self, key: &str) {
        self.guarded("key", |rt| rt.call_hook::<_, ()>("on_key_up", key).map(|_| ()));
    }

    /// Rebuilds the Lua state from scratch and runs the main chunk again.
    ///
    /// `engine.state` is carried across the rebuild and restored after the
    /// main chunk has run. Clears the suspended flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the new Lua state cannot be created.
    pub fn reset(&mut self) -> LuaResult<()> {
        let saved = match self.save_state() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("Could not save script state before reset: {}", err);
                None
            }
        };
        info!("Resetting Lua runtime");
        self.lua = Self::new(self.policy)?.lua;
        self.suspended = false;
        self.last_error = None;
        if let Some(main) = self.main.clone() {
            self.run_main_chunk(&main);
        }
        if let Some(bytes) = saved {
            self.restore_state(&bytes)?;
        }
        Ok(())
    }

    /// Pickles `engine.state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `engine` table is missing.
    pub fn save_state(&self) -> LuaResult<Vec<u8>> {
        let engine: LuaTable = self.lua.globals().get("engine")?;
        pickle(&engine.get::<LuaValue>("state")?)
    }

    /// Replaces `engine.state` with the unpickled `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid pickle.
    pub fn restore_state(&self, bytes: &[u8]) -> LuaResult<()> {
        let value = unpickle(&self.lua, bytes)?;
        let engine: LuaTable = self.lua.globals().get("engine")?;
        engine.set("state", value)
    }

    /// Runs two full collection cycles so finalizers get to release natives.
    pub fn gc_collect(&self) -> LuaResult<()> {
        self.lua.gc_collect()?;
        self.lua.gc_collect()
    }

    /// Drains all queued asset commands.
    ///
    /// Call this from a Rust system after Lua has queued commands via
    /// `engine.load_texture()`. The system can then process them with
    /// access to the necessary resources (RaylibHandle, etc.).
    pub fn drain_asset_commands(&self) -> Vec<AssetCmd> {
        self.lua
            .app_data_ref::<LuaAppData>()
            .map(|data| data.asset_commands.borrow_mut().drain(..).collect())
            .unwrap_or_default()
    }

    /// The node set with `engine.set_stage`.
    pub fn stage(&self) -> Option<Rc<SceneNode>> {
        self.lua
            .app_data_ref::<LuaAppData>()
            .and_then(|data| data.stage.borrow().clone())
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// The error that suspended the runtime, if any.
    pub fn last_error(&self) -> Option<&ScriptRuntimeError> {
        self.last_error.as_ref()
    }

    /// Calls a global Lua function by name with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the function doesn't exist or execution fails.
    pub fn call_function<A, R>(&self, name: &str, args: A) -> LuaResult<R>
    where
        A: IntoLuaMulti,
        R: FromLuaMulti,
    {
        let func: LuaFunction = self.lua.globals().get(name)?;
        func.call(args)
    }

    /// Checks if a global function exists.
    pub fn has_function(&self, name: &str) -> bool {
        self.lua.globals().get::<LuaFunction>(name).is_ok()
    }

    /// Returns a reference to the underlying Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Calls an optional hook; `None` when the script does not define it.
    fn call_hook<A, R>(&self, name: &str, args: A) -> LuaResult<Option<R>>
    where
        A: IntoLuaMulti,
        R: FromLuaMulti,
    {
        if !self.has_function(name) {
            return Ok(None);
        }
        self.call_function(name, args).map(Some)
    }

    /// Runs an entry point, applying the error policy to whatever escapes it.
    ///
    /// Does nothing and returns `None` while suspended.
    fn guarded<R>(&mut self, entry: &'static str, f: impl FnOnce(&Self) -> LuaResult<R>) -> Option<R> {
        if self.suspended {
            return None;
        }
        match f(self) {
            Ok(value) => Some(value),
            Err(source) => {
                self.fail(ScriptRuntimeError { entry, source });
                None
            }
        }
    }

    fn fail(&mut self, err: ScriptRuntimeError) {
        error!("{}", err);
        match self.policy {
            ErrorPolicy::Development => {
                warn!("Scripts suspended until reset");
                self.suspended = true;
                self.last_error = Some(err);
            }
            ErrorPolicy::Production => std::process::abort(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::render::{DrawCall, RecordingContext};

    fn runtime(source: &str) -> LuaRuntime {
        let mut rt = LuaRuntime::new(ErrorPolicy::Development).unwrap();
        assert!(rt.run_main_source("main", source));
        rt
    }

    #[test]
    fn test_advance_calls_hook() {
        let mut rt = runtime("total = 0 function on_advance(dt) total = total + dt end");
        rt.advance(0.5);
        rt.advance(0.25);
        let total: f64 = rt.lua().globals().get("total").unwrap();
        assert_eq!(total, 0.75);
    }

    #[test]
    fn test_error_suspends_in_development() {
        let mut rt = runtime("calls = 0 function on_advance() calls = calls + 1 error('boom') end");
        rt.advance(0.1);
        assert!(rt.is_suspended());
        assert_eq!(rt.last_error().unwrap().entry, "advance");
        rt.advance(0.1);
        let calls: i64 = rt.lua().globals().get("calls").unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_reset_clears_suspension_and_keeps_state() {
        let mut rt = runtime(
            "engine.state.count = (engine.state.count or 0) + 1 \
             function on_advance() error('boom') end",
        );
        rt.advance(0.1);
        assert!(rt.is_suspended());
        rt.reset().unwrap();
        assert!(!rt.is_suspended());
        let count: f64 = rt.lua().load("return engine.state.count").eval().unwrap();
        assert_eq!(count, 1.0);
    }

    #[test]
    fn test_render_draws_stage_without_hook() {
        let mut rt = runtime("engine.set_stage(engine.Rect(0, 0, 1, 1))");
        let mut ctx = RecordingContext::new();
        rt.render(&mut ctx);
        assert_eq!(ctx.primitives().len(), 1);
    }

    #[test]
    fn test_render_hook_draws_through_engine_draw() {
        let mut rt = runtime(
            "local a = engine.Line(0, 0, 1, 0) \
             function on_render() engine.draw(a) engine.draw(a) end",
        );
        let mut ctx = RecordingContext::new();
        rt.render(&mut ctx);
        assert_eq!(ctx.calls, vec![DrawCall::Line(0.0, 0.0, 1.0, 0.0); 2]);
        let draw: LuaValue = rt.lua().load("return engine.draw").eval().unwrap();
        assert!(draw.is_nil());
    }

    #[test]
    fn test_asset_commands_are_queued() {
        let rt = runtime("engine.load_texture('ball', 'ball.png') engine.unload_texture('old')");
        assert_eq!(
            rt.drain_asset_commands(),
            vec![
                AssetCmd::LoadTexture { id: "ball".into(), path: "ball.png".into() },
                AssetCmd::UnloadTexture { id: "old".into() },
            ]
        );
        assert!(rt.drain_asset_commands().is_empty());
    }

    #[test]
    fn test_pointer_hook_takes_precedence() {
        let mut rt = runtime("function on_pointer_down(id, x, y) last = x + y return false end");
        let consumed = rt.pointer_event(&PointerEvent::new(PointerEventKind::Down, 1, 2.0, 3.0));
        assert!(!consumed);
        let last: f64 = rt.lua().globals().get("last").unwrap();
        assert_eq!(last, 5.0);
    }

    #[test]
    fn test_key_hooks() {
        let mut rt = runtime("keys = '' function on_key_down(k) keys = keys .. '+' .. k end \
                              function on_key_up(k) keys = keys .. '-' .. k end");
        rt.key_down("left");
        rt.key_up("left");
        let keys: String = rt.lua().globals().get("keys").unwrap();
        assert_eq!(keys, "+left-left");
    }
}
