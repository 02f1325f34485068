mod chart;
mod logger;
mod style;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use iced::{Element, Size, Subscription, Task, Theme, window};

use chart::candles::CandleChart;
use chart::overlay::{LiquidationOverlay, MarkerOverlay, WhaleOverlay};
use data::util::Throttle;
use feed::sim::SimFeed;
use feed::{BarFeed, MarkerFeed, OrderbookFeed};
use style::DefaultColors;

const TICK_SIZE: f32 = 0.1;
const SIM_START_PRICE: f32 = 50_000.0;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RENDER_COOLDOWN: Duration = Duration::from_millis(100);

fn main() -> iced::Result {
    logger::setup(cfg!(debug_assertions)).expect("Failed to initialize logger");

    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        log::error!("Panic at {location}: {info}");
    }));

    let saved_state = data::read_from_file(data::SAVED_STATE_PATH).unwrap_or_else(|err| {
        log::info!("No saved state restored ({err}); starting with defaults");
        data::State::default()
    });

    let (width, height) = saved_state.window_size.unwrap_or((1280.0, 800.0));

    iced::application(
        move || (Candleflow::new(saved_state.clone()), Task::none()),
        Candleflow::update,
        Candleflow::view,
    )
    .title("candleflow")
    .theme(Candleflow::theme)
    .subscription(Candleflow::subscription)
    .window(window::Settings {
        size: Size::new(width, height),
        min_size: Some(Size::new(640.0, 480.0)),
        exit_on_close_request: false,
        ..Default::default()
    })
    .run()
}

/// Single simulated market shared by all three feed handles.
#[derive(Clone)]
struct SharedSim(Rc<RefCell<SimFeed>>);

impl BarFeed for SharedSim {
    fn poll_bars(&mut self, now_ms: u64) -> Vec<feed::Bar> {
        self.0.borrow_mut().poll_bars(now_ms)
    }
}

impl OrderbookFeed for SharedSim {
    fn poll_snapshot(&mut self, now_ms: u64) -> Option<feed::depth::DepthSnapshot> {
        self.0.borrow_mut().poll_snapshot(now_ms)
    }
}

impl MarkerFeed for SharedSim {
    fn poll_markers(&mut self, now_ms: u64) -> Vec<feed::marker::Marker> {
        self.0.borrow_mut().poll_markers(now_ms)
    }
}

#[derive(Debug, Clone)]
enum Message {
    Tick,
    Chart(chart::Message),
    WindowResized(window::Id, Size),
    WindowClosing(window::Id),
}

struct Candleflow {
    chart: CandleChart,
    bar_feed: Box<dyn BarFeed>,
    book_feed: Box<dyn OrderbookFeed>,
    marker_feed: Box<dyn MarkerFeed>,
    render_throttle: Throttle,
    state: data::State,
}

impl Candleflow {
    fn new(state: data::State) -> Self {
        let overlays: Vec<Box<dyn MarkerOverlay>> = vec![
            Box::new(LiquidationOverlay::default()),
            Box::new(WhaleOverlay::default()),
        ];

        let chart = CandleChart::new(
            state.timeframe,
            TICK_SIZE,
            Box::new(DefaultColors),
            overlays,
            state.show_vwap,
            state.show_heatmap,
        );

        let seed = chrono::Utc::now().timestamp_millis().max(1) as u64;
        let sim = SharedSim(Rc::new(RefCell::new(SimFeed::new(
            state.timeframe,
            SIM_START_PRICE,
            TICK_SIZE,
            seed,
        ))));

        Self {
            chart,
            bar_feed: Box::new(sim.clone()),
            book_feed: Box::new(sim.clone()),
            marker_feed: Box::new(sim),
            render_throttle: Throttle::new(RENDER_COOLDOWN),
            state,
        }
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;

                // data intake strictly before the redraw decision, so a
                // granted redraw always renders the freshest state
                for bar in self.bar_feed.poll_bars(now_ms) {
                    self.chart.update_latest_bar(&bar, now_ms);
                }
                if let Some(snapshot) = self.book_feed.poll_snapshot(now_ms) {
                    self.chart.update_depth(snapshot);
                }
                for marker in self.marker_feed.poll_markers(now_ms) {
                    self.chart.push_marker(&marker);
                }

                if self.render_throttle.try_acquire() {
                    chart::Chart::invalidate_all(&mut self.chart);
                }

                Task::none()
            }
            Message::Chart(message) => {
                chart::update(&mut self.chart, &message);
                Task::none()
            }
            Message::WindowResized(_id, size) => {
                self.state.window_size = Some((size.width, size.height));
                Task::none()
            }
            Message::WindowClosing(id) => {
                self.save_state();
                window::close(id)
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        chart::view(&self.chart).map(Message::Chart)
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            iced::time::every(POLL_INTERVAL).map(|_| Message::Tick),
            window::resize_events().map(|(id, size)| Message::WindowResized(id, size)),
            window::close_requests().map(Message::WindowClosing),
        ])
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }

    fn save_state(&self) {
        match serde_json::to_string(&self.state) {
            Ok(json) => {
                if let Err(err) = data::write_json_to_file(&json, data::SAVED_STATE_PATH) {
                    log::error!("Failed to save application state: {err}");
                } else {
                    log::info!("Saved application state");
                }
            }
            Err(err) => log::error!("Failed to serialize application state: {err}"),
        }
    }
}
