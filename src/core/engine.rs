//! Navigation engine
//!
//! `Engine` owns every piece of navigation state: the text index, the
//! cursor, the tokenization gateway, the pointer, the confirm gate and the
//! timers. Inputs from every source (server messages, popup notifications,
//! surface mutations, keyboard shortcuts, timer ticks) become method calls
//! on it from a single task, so no state here is shared or locked.
//!
//! Methods take `now` explicitly; timers are deadlines that `tick` fires.

use crate::config::Config;
use crate::core::confirm::{
    anchor_key, pointer_key, ConfirmDecision, ConfirmGate, PendingMineCandidate, PopupTracker,
};
use crate::core::feedback::{FeedbackRenderer, Overlay};
use crate::core::furigana::{FuriganaReceiver, FuriganaRequests};
use crate::core::input_router::{dpad_direction, route_press, route_release, Direction, PadAction, RouteContext};
use crate::core::navigation::{self, Resolution, Thresholds};
use crate::core::pointer::{PointerEmulator, PopupStick};
use crate::core::protocol::{InboundMessage, OutboundMessage};
use crate::core::state::GamepadRegistry;
use crate::core::text_index::TextIndex;
use crate::core::timers::{DismissDebouncer, RepeatScheduler};
use crate::core::tokenizer::{ResponseOutcome, TokenizeReply, TokenizerGateway};
use crate::data::{
    BlockId, CharTarget, ControlMessage, Granularity, NavigationCursor, Point, PopupEvent,
    SyntheticEvent, Token, UnitKind,
};
use crate::lookup::LookupTool;
use crate::surface::TextSurface;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Where a confirm press lands
#[derive(Debug, Clone, PartialEq)]
struct AnchorTarget {
    block: BlockId,
    /// Index into the block's filtered characters
    char_index: usize,
    point: Point,
    target: CharTarget,
}

pub struct Engine<S: TextSurface, L: LookupTool> {
    /// Configuration the engine was built with
    config: Config,

    /// Text surface collaborator
    surface: S,

    /// Lookup tool collaborator (receives synthetic events)
    lookup: L,

    /// Snapshot of blocks, characters, lines and tokens
    index: TextIndex,

    cursor: NavigationCursor,

    /// Requested granularity (tokens fall back to characters per block)
    granularity: Granularity,

    /// Navigation is on
    active: bool,

    /// Navigation was switched on by a toggle rather than a held modifier
    sticky: bool,

    /// Right stick has started cycling popup actions
    action_selection: bool,

    gamepads: GamepadRegistry,
    tokenizer: TokenizerGateway,
    furigana: FuriganaRequests,
    pointer: PointerEmulator,
    popup_stick: PopupStick,
    gate: ConfirmGate,
    popups: PopupTracker,
    repeat: RepeatScheduler,
    dismiss: DismissDebouncer,
    feedback: FeedbackRenderer,
    thresholds: Thresholds,

    outbound: Option<mpsc::UnboundedSender<OutboundMessage>>,

    /// Connection status to the Input Server
    connected: bool,

    /// Surface mutated since the last rebuild
    dirty: bool,
}

impl<S: TextSurface, L: LookupTool> Engine<S, L> {
    pub fn new(config: Config, surface: S, lookup: L) -> Self {
        let nav = &config.navigation;
        Self {
            index: TextIndex::new(nav.line_tolerance_px),
            cursor: NavigationCursor::default(),
            granularity: nav.initial_granularity(),
            active: false,
            sticky: false,
            action_selection: false,
            gamepads: GamepadRegistry::new(),
            tokenizer: TokenizerGateway::new(&config.tokenizer),
            furigana: FuriganaRequests::new(config.tokenizer.furigana_timeout_ms),
            pointer: PointerEmulator::new(&config.pointer),
            popup_stick: PopupStick::new(&config.pointer),
            gate: ConfirmGate::new(),
            popups: PopupTracker::new(),
            repeat: RepeatScheduler::new(nav.repeat_delay_ms, nav.repeat_rate_ms),
            dismiss: DismissDebouncer::new(nav.dismiss_debounce_ms),
            feedback: FeedbackRenderer::new(&config.feedback),
            thresholds: Thresholds::from(nav),
            outbound: None,
            connected: false,
            dirty: true,
            surface,
            lookup,
            config,
        }
    }

    /// Channel for messages to the Input Server
    pub fn set_outbound(&mut self, outbound: mpsc::UnboundedSender<OutboundMessage>) {
        self.tokenizer.set_outbound(outbound.clone());
        self.outbound = Some(outbound);
    }

    /// Channel local tokenizer results come back on
    pub fn set_token_replies(&mut self, replies: mpsc::UnboundedSender<TokenizeReply>) {
        self.tokenizer.set_replies(replies);
    }

    // ---- accessors ----

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable surface; call `on_surface_mutated` if the surface does not notify
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn lookup_mut(&mut self) -> &mut L {
        &mut self.lookup
    }

    pub fn index(&self) -> &TextIndex {
        &self.index
    }

    pub fn cursor(&self) -> NavigationCursor {
        self.cursor
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// What units currently are for the active block
    pub fn unit_kind(&self) -> UnitKind {
        self.index.unit_kind(self.granularity)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn engine_available(&self) -> bool {
        self.tokenizer.engine_available()
    }

    pub fn popup_count(&self) -> usize {
        self.popups.count()
    }

    pub fn action_selection_active(&self) -> bool {
        self.action_selection
    }

    pub fn pending_candidate(&self) -> Option<&PendingMineCandidate> {
        self.gate.candidate()
    }

    pub fn gamepads(&self) -> &GamepadRegistry {
        &self.gamepads
    }

    pub fn overlay(&self) -> &Overlay {
        self.feedback.overlay()
    }

    pub fn pointer_position(&self) -> Option<Point> {
        self.pointer.position()
    }

    // ---- activation ----

    pub fn activate(&mut self, now: Instant) {
        if self.enter(now) {
            self.reposition(now);
        }
    }

    /// Switch navigation on without moving the pointer; false if already on
    fn enter(&mut self, now: Instant) -> bool {
        if self.active {
            return false;
        }
        self.refresh(now);
        self.active = true;
        info!("Navigation activated");

        if !self.cursor.block.is_some_and(|b| self.index.is_selectable(b)) {
            self.select_block(self.index.first_selectable_block(), 0);
        } else if self.index.block_count() == 1 {
            self.cursor.unit = 0;
        }
        self.request_active_tokens();
        self.clamp_cursor();
        self.refresh_feedback();
        true
    }

    pub fn deactivate(&mut self, now: Instant) {
        if !self.active {
            return;
        }
        self.active = false;
        self.sticky = false;
        self.action_selection = false;
        info!("Navigation deactivated");

        self.gate.clear();
        self.feedback.hide();
        self.pointer.clear();
        self.popup_stick.clear();
        self.repeat.clear();
        self.lookup.dispatch(SyntheticEvent::PointerLeave);
        self.dismiss_popup(now, true);
    }

    pub fn toggle_navigation(&mut self, now: Instant) {
        if self.active {
            self.deactivate(now);
        } else {
            self.activate(now);
            self.sticky = true;
        }
    }

    // ---- navigation ----

    pub fn navigate(&mut self, direction: Direction, now: Instant) {
        if !self.active {
            return;
        }
        self.ensure_fresh(now);
        self.clamp_cursor();
        self.gate.clear();
        self.dismiss_popup(now, false);

        let kind = self.unit_kind();
        match navigation::resolve(&self.index, kind, &self.cursor, direction, &self.thresholds) {
            Resolution::Within(unit) => self.cursor.unit = unit,
            Resolution::Block { block, entry } => {
                self.select_block(Some(block), 0);
                let kind = self.unit_kind();
                self.cursor.unit = navigation::entry_unit(&self.index, kind, entry);
                self.request_active_tokens();
            }
            Resolution::Stay => {}
        }
        self.clamp_cursor();
        debug!(
            "Navigate {:?} -> block {:?} unit {} line {}",
            direction, self.cursor.block, self.cursor.unit, self.cursor.line
        );

        self.refresh_feedback();
        self.reposition(now);
    }

    pub fn toggle_token_mode(&mut self, now: Instant) {
        self.granularity = self.granularity.toggled();
        info!("Granularity: {:?}", self.granularity);
        self.gate.clear();
        self.ensure_fresh(now);
        self.cursor.unit = 0;

        if self.granularity == Granularity::Token {
            self.prefetch_tokens();
        }
        self.clamp_cursor();
        if self.active {
            self.refresh_feedback();
            self.snap_pointer(now);
        }
    }

    // ---- confirm / cancel ----

    pub fn confirm(&mut self, now: Instant) {
        if !self.active {
            return;
        }
        if self.action_selection && self.popups.is_visible() {
            self.lookup
                .dispatch(SyntheticEvent::Control(ControlMessage::ConfirmAction));
            return;
        }
        self.ensure_fresh(now);
        self.clamp_cursor();

        let (candidate, point, target) = if self.pointer.recently_moved(now) {
            match self.pointer_target() {
                Some(found) => found,
                None => return,
            }
        } else {
            let Some(anchor) = self.live_anchor(now) else {
                debug!("Confirm skipped: no target");
                return;
            };
            let candidate = PendingMineCandidate {
                anchor_key: anchor_key(self.unit_kind(), anchor.block, anchor.char_index),
                block: self.cursor.block.unwrap_or_default(),
                unit: self.cursor.unit,
            };
            (candidate, anchor.point, Some(anchor.target))
        };

        match self.gate.confirm(candidate, self.popups.is_visible()) {
            ConfirmDecision::Mine => {
                info!("Mine");
                self.lookup
                    .dispatch(SyntheticEvent::Control(ControlMessage::Mine {
                        card_format_index: 0,
                    }));
            }
            ConfirmDecision::Lookup => self.dispatch_lookup(point, target),
        }
    }

    /// Lookup at the cursor unit; never arms a mine candidate
    pub fn auto_confirm(&mut self, now: Instant) {
        self.gate.clear();
        if !self.active {
            return;
        }
        if let Some(anchor) = self.live_anchor(now) {
            self.dispatch_lookup(anchor.point, Some(anchor.target));
        }
    }

    pub fn cancel(&mut self, now: Instant) {
        if self.action_selection {
            self.action_selection = false;
            self.lookup
                .dispatch(SyntheticEvent::Control(ControlMessage::ResetActionSelection));
            return;
        }
        self.gate.clear();
        self.dismiss_popup(now, true);
    }

    fn dispatch_lookup(&mut self, at: Point, target: Option<CharTarget>) {
        self.lookup.dispatch(SyntheticEvent::PointerMove { at, target });
        self.lookup.dispatch(SyntheticEvent::Click { at, target });
    }

    fn dismiss_popup(&mut self, now: Instant, force: bool) {
        let due = self.dismiss.should_dispatch(now);
        if force || due {
            self.lookup.dispatch(SyntheticEvent::Click {
                at: self.config.navigation.dismiss_point,
                target: None,
            });
        }
    }

    // ---- manual entry points ----

    pub fn manual_activate(&mut self, now: Instant) {
        self.activate(now);
        self.sticky = true;
    }

    pub fn manual_deactivate(&mut self, now: Instant) {
        self.deactivate(now);
    }

    pub fn manual_toggle(&mut self, now: Instant) {
        self.toggle_navigation(now);
    }

    pub fn manual_navigate(&mut self, direction: Direction, now: Instant) {
        if self.enter(now) {
            self.sticky = true;
        }
        self.navigate(direction, now);
    }

    pub fn manual_up(&mut self, now: Instant) {
        self.manual_navigate(Direction::Up, now);
    }

    pub fn manual_down(&mut self, now: Instant) {
        self.manual_navigate(Direction::Down, now);
    }

    pub fn manual_left(&mut self, now: Instant) {
        self.manual_navigate(Direction::Left, now);
    }

    pub fn manual_right(&mut self, now: Instant) {
        self.manual_navigate(Direction::Right, now);
    }

    pub fn manual_toggle_token_mode(&mut self, now: Instant) {
        self.toggle_token_mode(now);
    }

    // ---- surface ----

    /// Record a mutation; the rebuild happens once in `flush_refresh`
    pub fn on_surface_mutated(&mut self) {
        self.dirty = true;
    }

    /// Rebuild the index if the surface changed since the last rebuild
    pub fn flush_refresh(&mut self, now: Instant) {
        if self.dirty {
            self.refresh(now);
        }
    }

    fn ensure_fresh(&mut self, now: Instant) {
        let stale = self.cursor.block.is_some() && !self.index.is_attached(&self.surface);
        if self.dirty || stale {
            self.refresh(now);
        }
    }

    /// Rebuild the index and put the cursor somewhere valid
    fn refresh(&mut self, now: Instant) {
        self.dirty = false;

        let previous_count = self.index.block_count();
        let previous = self.cursor.block.and_then(|b| {
            let id = self.index.block(b)?.id;
            Some((b, id, self.index.block_text(b).unwrap_or_default().to_string()))
        });

        self.index.rebuild_blocks(&self.surface);
        let count = self.index.block_count();
        self.tokenizer.cache_mut().prune(count);

        let mut moved = false;
        match previous {
            _ if count == 0 => {
                self.cursor = NavigationCursor::default();
                self.index.load_active(&self.surface, None, self.tokenizer.cache());
            }
            Some((b, _, _)) if b + 1 == previous_count && count > previous_count => {
                // Cursor was on the last block and text was appended
                let last = count - 1;
                let target = if self.index.is_selectable(last) {
                    Some(last)
                } else {
                    self.index.first_selectable_block()
                };
                self.select_block(target, 0);
                moved = true;
            }
            Some((_, id, text)) => match self.index.block_index_of(id).filter(|&i| self.index.is_selectable(i)) {
                Some(i) => {
                    let unit = self.cursor.unit;
                    self.select_block(Some(i), unit);
                    let changed = self.index.block_text(i) != Some(text.as_str());
                    if changed && count == 1 {
                        self.cursor.unit = 0;
                        moved = true;
                    }
                }
                None => {
                    let target = if count == 1 { Some(0) } else { self.index.first_selectable_block() };
                    let target = target.filter(|&b| self.index.is_selectable(b)).or(self.index.first_selectable_block());
                    self.select_block(target, 0);
                    moved = true;
                }
            },
            None => {
                if self.active {
                    self.select_block(self.index.first_selectable_block(), 0);
                    moved = true;
                } else {
                    self.index.load_active(&self.surface, None, self.tokenizer.cache());
                }
            }
        }
        self.clamp_cursor();

        if self.granularity == Granularity::Token {
            self.prefetch_tokens();
        }

        if self.active {
            self.refresh_feedback();
            if moved {
                // The popup may be anchored to text that is gone
                self.gate.clear();
                self.dismiss_popup(now, false);
                self.reposition(now);
            }
        }
    }

    /// Make `block` active and place the cursor on `unit`
    fn select_block(&mut self, block: Option<usize>, unit: usize) {
        self.index.load_active(&self.surface, block, self.tokenizer.cache());
        self.cursor.block = self.index.active();
        self.cursor.unit = unit;
        self.clamp_cursor();
    }

    /// Keep the cursor inside the active block's unit range
    fn clamp_cursor(&mut self) {
        if self.cursor.block.is_some() && self.index.active() != self.cursor.block {
            let block = self.cursor.block.filter(|&b| b < self.index.block_count());
            self.index.load_active(&self.surface, block, self.tokenizer.cache());
            self.cursor.block = self.index.active();
        }
        let count = self.index.unit_count(self.unit_kind());
        self.cursor.unit = self.cursor.unit.min(count.saturating_sub(1));
        self.cursor.line = self.index.unit_line(self.unit_kind(), self.cursor.unit);
    }

    // ---- pointer and feedback ----

    /// Snap the pointer to the cursor unit, then auto-confirm if enabled
    fn reposition(&mut self, now: Instant) {
        self.snap_pointer(now);
        if self.config.navigation.auto_confirm {
            self.auto_confirm(now);
        }
    }

    fn snap_pointer(&mut self, now: Instant) {
        let Some(anchor) = self.live_anchor(now) else {
            return;
        };
        self.pointer.snap_to(anchor.point);
        self.feedback.set_pointer(Some(anchor.point));
        self.lookup.dispatch(SyntheticEvent::PointerMove {
            at: anchor.point,
            target: Some(anchor.target),
        });
    }

    /// Cursor anchor with live geometry, rebuilding once if the surface moved on
    fn live_anchor(&mut self, now: Instant) -> Option<AnchorTarget> {
        if let Some(anchor) = self.read_anchor() {
            return Some(anchor);
        }
        if self.cursor.block.is_none() {
            return None;
        }
        debug!("Stale geometry; rebuilding index");
        self.refresh(now);
        self.read_anchor()
    }

    fn read_anchor(&self) -> Option<AnchorTarget> {
        let block = self.index.block(self.cursor.block?)?;
        if !self.surface.is_attached(block.id) {
            return None;
        }
        let char_index = self.index.anchor_char(self.unit_kind(), self.cursor.unit)?;
        let ch = self.index.characters().get(char_index)?;
        let rect = self.surface.bounding_rect(block.id, ch.surface_index)?;
        Some(AnchorTarget {
            block: block.id,
            char_index,
            point: rect.center(),
            target: CharTarget {
                block: block.id,
                char_index: ch.surface_index,
            },
        })
    }

    /// Confirm target under the virtual pointer
    fn pointer_target(&self) -> Option<(PendingMineCandidate, Point, Option<CharTarget>)> {
        let at = self.pointer.position()?;
        let hit = self.hit_test(at);
        let (block_index, target) = match hit {
            Some((b, target)) => (b, Some(target)),
            None => (self.cursor.block.unwrap_or_default(), None),
        };
        let block_id = self.index.block(block_index).map(|b| b.id).unwrap_or(BlockId(0));
        let candidate = PendingMineCandidate {
            anchor_key: pointer_key(block_id, target.and_then(|t| t.char_index), at),
            block: block_index,
            unit: self.cursor.unit,
        };
        Some((candidate, at, target))
    }

    /// Block and character under a point
    fn hit_test(&self, at: Point) -> Option<(usize, CharTarget)> {
        for block in self.index.blocks() {
            if !self.surface.is_visible(block.id, None) {
                continue;
            }
            let rect = self.surface.bounding_rect(block.id, None).unwrap_or(block.rect);
            if !rect.contains(at) {
                continue;
            }
            let chars = self.surface.characters_of(block.id);
            if chars.is_empty() {
                return Some((
                    block.index,
                    CharTarget {
                        block: block.id,
                        char_index: None,
                    },
                ));
            }
            if let Some(i) = chars
                .iter()
                .position(|c| c.visible && c.selectable && c.rect.contains(at))
            {
                return Some((
                    block.index,
                    CharTarget {
                        block: block.id,
                        char_index: Some(i),
                    },
                ));
            }
        }
        None
    }

    fn refresh_feedback(&mut self) {
        if !self.active {
            self.feedback.hide();
            return;
        }
        let Some(block) = self.index.active_block() else {
            self.feedback.hide();
            return;
        };
        let id = block.id;
        let block_rect = self.surface.bounding_rect(id, None).or(Some(block.rect));
        let kind = self.unit_kind();
        let unit_rect = self.index.unit_rect(kind, self.cursor.unit);
        let label = match (self.granularity, kind) {
            (Granularity::Character, _) => "char",
            (Granularity::Token, UnitKind::Token) => "token",
            (Granularity::Token, UnitKind::Character) => "token (char fallback)",
        };
        self.feedback.show(id, block_rect, unit_rect, label);
        self.feedback.set_pointer(self.pointer.position());
    }

    // ---- tokenization ----

    fn request_active_tokens(&mut self) {
        if self.granularity != Granularity::Token {
            return;
        }
        if let Some(b) = self.index.active() {
            let text = self.index.block_text(b).unwrap_or_default().to_string();
            self.tokenizer.request(b, &text, self.connected);
        }
    }

    /// Request tokens for every visible block
    fn prefetch_tokens(&mut self) {
        for b in 0..self.index.block_count() {
            if !self.index.is_selectable(b) {
                continue;
            }
            let text = self.index.block_text(b).unwrap_or_default().to_string();
            self.tokenizer.request(b, &text, self.connected);
        }
    }

    /// Tokens computed for (`block`, `text`) by either backend
    pub fn on_tokens(&mut self, block: usize, text: &str, tokens: Result<Vec<Token>, String>, now: Instant) {
        let current = self.index.block_text(block).map(str::to_string);
        let outcome = self
            .tokenizer
            .on_response(block, text, tokens, current.as_deref(), self.connected);
        debug!("Tokens for block {}: {:?}", block, outcome);

        if outcome != (ResponseOutcome::Applied { block }) || self.index.active() != Some(block) {
            return;
        }
        let Some(tokens) = self.tokenizer.cache().tokens_for(block, text).map(|t| t.to_vec()) else {
            return;
        };

        let kind_before = self.unit_kind();
        let anchor_before = self.index.anchor_char(kind_before, self.cursor.unit);
        self.index.apply_tokens(tokens);

        if self.granularity != Granularity::Token || kind_before == UnitKind::Token {
            self.clamp_cursor();
            if self.active {
                self.refresh_feedback();
            }
            return;
        }

        // Cursor was on a character fallback unit: convert to the containing token
        let char_index = anchor_before.unwrap_or(0);
        self.cursor.unit = self.index.char_index_to_token_index(char_index);
        self.clamp_cursor();
        let anchor_after = self.index.anchor_char(UnitKind::Token, self.cursor.unit);

        if self.active {
            self.refresh_feedback();
            if anchor_after != anchor_before {
                self.reposition(now);
            }
        }
    }

    pub fn on_local_tokens(&mut self, reply: TokenizeReply, now: Instant) {
        self.tokenizer.set_engine_available(reply.result.is_ok());
        let result = reply.result.map_err(|e| e.to_string());
        self.on_tokens(reply.block, &reply.text, result, now);
    }

    // ---- furigana ----

    pub fn request_furigana(&mut self, text: &str, line_index: usize, now: Instant) -> FuriganaReceiver {
        self.furigana
            .request(text, line_index, self.outbound.as_ref(), self.connected, now)
    }

    /// Furigana for the cursor's line of the active block
    pub fn request_cursor_furigana(&mut self, now: Instant) -> Option<FuriganaReceiver> {
        let line = self.index.lines().get(self.cursor.line)?;
        let text: String = line
            .indices
            .iter()
            .filter_map(|&i| self.index.characters().get(i))
            .map(|c| c.text.as_str())
            .collect();
        let line_index = self.cursor.line;
        Some(self.request_furigana(&text, line_index, now))
    }

    // ---- popups ----

    pub fn on_popup_event(&mut self, event: PopupEvent) {
        match event {
            PopupEvent::Shown { id } => {
                self.popups.on_shown(id);
                debug!("Popup shown ({} visible)", self.popups.count());
            }
            PopupEvent::Hidden { id } => {
                self.gate.clear();
                if self.popups.on_hidden(id.as_ref()) {
                    debug!("Last popup hidden");
                    self.action_selection = false;
                    self.popup_stick.clear();
                    self.lookup
                        .dispatch(SyntheticEvent::Control(ControlMessage::ClearActionSelection));
                }
            }
        }
    }

    // ---- Input Server ----

    pub fn on_connection(&mut self, connected: bool, now: Instant) {
        self.connected = connected;
        self.gamepads.connected = connected;
        if connected {
            info!("Connected to input server");
            self.request_active_tokens();
        } else {
            info!("Disconnected from input server");
            self.tokenizer.on_disconnected();
            self.furigana.fail_all();
            self.gamepads.clear();
            self.repeat.clear();
            if self.active && !self.sticky {
                self.deactivate(now);
            }
        }
    }

    pub fn handle_inbound(&mut self, msg: InboundMessage, now: Instant) {
        match msg {
            InboundMessage::GamepadConnected { device, state } => {
                info!("Gamepad connected: {}", device);
                self.gamepads.on_connected(&device, state.as_ref());
            }
            InboundMessage::GamepadDisconnected { device } => {
                info!("Gamepad disconnected: {}", device);
                self.gamepads.on_disconnected(&device);
                self.repeat.stop_device(&device);
            }
            InboundMessage::GamepadState { device, buttons, axes } => {
                self.gamepads.on_state(&device, &buttons, &axes);
                // One integration step per message, however many axes it carries
                for axis in ["left_x", "left_y", "right_x", "right_y"] {
                    if let Some(value) = axes.get(axis) {
                        self.set_axis(axis, *value);
                    }
                }
                if axes.contains_key("left_x") || axes.contains_key("left_y") {
                    self.step_pointer(now);
                }
                if axes.contains_key("right_y") {
                    self.step_scroll(now);
                }
            }
            InboundMessage::Button {
                device,
                button,
                pressed,
                ..
            } => {
                self.gamepads.on_button(&device, button, pressed);
                self.on_button(&device, button, pressed, now);
            }
            InboundMessage::Axis { device, axis, value } => {
                self.gamepads.on_axis(&device, &axis, value);
                self.on_axis(&axis, value, now);
            }
            InboundMessage::Tokens {
                block_index,
                tokens,
                text,
                mecab_available,
                ..
            } => {
                self.tokenizer.set_engine_available(mecab_available);
                self.on_tokens(block_index, &text, Ok(tokens), now);
            }
            InboundMessage::Furigana {
                line_index,
                segments,
                text,
                request_id,
                ..
            } => {
                self.furigana.on_response(request_id, line_index, &text, segments);
            }
            InboundMessage::Pong => debug!("pong"),
        }
    }

    fn on_button(&mut self, device: &str, button: u32, pressed: bool, now: Instant) {
        let buttons = self.config.buttons.clone();
        let ctx = RouteContext {
            active: self.active,
            sticky: self.sticky,
            modifier_held: self.gamepads.is_pressed(device, buttons.modifier),
        };
        let action = if pressed {
            route_press(button, &buttons, ctx)
        } else {
            route_release(button, &buttons, ctx)
        };

        match action {
            PadAction::ToggleNavigation => self.toggle_navigation(now),
            PadAction::Confirm => self.confirm(now),
            PadAction::Cancel => self.cancel(now),
            PadAction::ToggleGranularity => self.toggle_token_mode(now),
            PadAction::Navigate { direction, activate } => {
                if activate {
                    self.enter(now);
                }
                self.navigate(direction, now);
                self.repeat.start(device, direction, now);
            }
            PadAction::StopRepeat(direction) => self.repeat.stop(device, direction),
            PadAction::Deactivate => self.deactivate(now),
            PadAction::None => {}
        }
    }

    fn on_axis(&mut self, axis: &str, value: f64, now: Instant) {
        self.set_axis(axis, value);
        match axis {
            "left_x" | "left_y" => self.step_pointer(now),
            "right_y" => self.step_scroll(now),
            _ => {}
        }
    }

    /// Record a stick value; `right_x` acts immediately since it is edge-triggered
    fn set_axis(&mut self, axis: &str, value: f64) {
        match axis {
            "left_x" if self.active => self.pointer.set_axis_x(value),
            "left_y" if self.active => self.pointer.set_axis_y(value),
            "right_y" if self.popups.is_visible() => self.popup_stick.set_scroll_axis(value),
            "right_x" if self.popups.is_visible() => {
                if let Some(direction) = self.popup_stick.action_edge(value) {
                    self.action_selection = true;
                    self.lookup
                        .dispatch(SyntheticEvent::Control(ControlMessage::SelectAction { direction }));
                }
            }
            _ => {}
        }
    }

    fn step_pointer(&mut self, now: Instant) {
        if !self.active {
            return;
        }
        let viewport = self.surface.viewport();
        if let Some(at) = self.pointer.step(now, viewport) {
            let target = self.hit_test(at).map(|(_, t)| t);
            self.feedback.set_pointer(Some(at));
            self.lookup.dispatch(SyntheticEvent::PointerMove { at, target });
        }
    }

    fn step_scroll(&mut self, now: Instant) {
        if !self.popups.is_visible() {
            return;
        }
        if let Some(delta) = self.popup_stick.scroll_step(now) {
            self.lookup
                .dispatch(SyntheticEvent::Control(ControlMessage::Scroll { delta }));
        }
    }

    // ---- timers ----

    pub fn tick(&mut self, now: Instant) {
        self.furigana.tick(now);

        for (device, direction) in self.repeat.due(now) {
            let held = self.direction_held(&device, direction);
            if self.active && held {
                self.navigate(direction, now);
            } else {
                self.repeat.stop(&device, direction);
            }
        }
    }

    fn direction_held(&self, device: &str, direction: Direction) -> bool {
        let buttons = &self.config.buttons;
        [buttons.dpad_up, buttons.dpad_down, buttons.dpad_left, buttons.dpad_right]
            .into_iter()
            .filter(|&b| dpad_direction(b, buttons) == Some(direction))
            .any(|b| self.gamepads.is_pressed(device, b))
    }

    /// Earliest time `tick` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.repeat.next_deadline(), self.furigana.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }
}
