use crate::game::{ClientGame, ClientSession};
use macroquad::prelude::*;
use shared::{COURT_HEIGHT, COURT_WIDTH};

const NET_PINK: Color = Color::new(1.0, 0.176, 0.584, 1.0);
const NET_DASH: f64 = 4.0;
const HEADER_SIZE: f32 = 28.0;

/// Maps court units onto the window: the court fills the window height and
/// is centred horizontally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourtView {
    pub scale: f32,
    pub offset_x: f32,
}

impl CourtView {
    pub fn fit(width: f32, height: f32) -> Self {
        let scale = (height / COURT_HEIGHT as f32).min(width / COURT_WIDTH as f32);
        let offset_x = (width - COURT_WIDTH as f32 * scale) / 2.0;
        CourtView { scale, offset_x }
    }

    pub fn x(&self, x: f64) -> f32 {
        self.offset_x + x as f32 * self.scale
    }

    pub fn y(&self, y: f64) -> f32 {
        y as f32 * self.scale
    }

    pub fn size(&self, length: f64) -> f32 {
        length as f32 * self.scale
    }
}

pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Renderer
    }

    pub fn render(&mut self, session: &ClientSession) {
        clear_background(BLACK);

        let view = CourtView::fit(screen_width(), screen_height());
        self.draw_net(&view);
        self.draw_court(&view, &session.game);
        self.draw_header(&view, session);
    }

    fn draw_net(&mut self, view: &CourtView) {
        let x = view.x(COURT_WIDTH / 2.0);
        let mut y = 0.0;
        while y < COURT_HEIGHT {
            let end = (y + NET_DASH).min(COURT_HEIGHT);
            draw_line(x, view.y(y), x, view.y(end), view.size(0.5).max(1.0), NET_PINK);
            y += NET_DASH * 2.0;
        }
    }

    fn draw_court(&mut self, view: &CourtView, game: &ClientGame) {
        for paddle in [&game.paddle_left, &game.paddle_right] {
            draw_rectangle(
                view.x(paddle.x),
                view.y(paddle.y),
                view.size(paddle.width),
                view.size(paddle.height),
                WHITE,
            );
        }

        draw_circle(
            view.x(game.ball.x),
            view.y(game.ball.y),
            view.size(game.ball.radius),
            WHITE,
        );
    }

    fn draw_header(&mut self, view: &CourtView, session: &ClientSession) {
        let title = session.header.title(session.game.is_running());
        let size = measure_text(&title, None, HEADER_SIZE as u16, 1.0);
        let center = view.x(COURT_WIDTH / 2.0);
        draw_text(&title, center - size.width / 2.0, HEADER_SIZE + 8.0, HEADER_SIZE, WHITE);

        if let Some(message) = &session.header.last_error {
            draw_text(message, view.offset_x + 10.0, screen_height() - 12.0, 18.0, RED);
        }

        let open = session.header.tournaments.iter().filter(|t| !t.started).count();
        let listing = format!("{} tournaments, {} open", session.header.tournaments.len(), open);
        draw_text(&listing, view.offset_x + 10.0, 20.0, 16.0, GRAY);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
