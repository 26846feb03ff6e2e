use super::{Animation, AnimationSpec, Capabilities, FrameInfo, Param, ParamKind};
use crate::compositor::Canvas;
use crate::display::Color;

/// Fills the whole region with one color
pub struct Solid {
    color: Color,
}

impl Solid {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Animation for Solid {
    fn paint(&mut self, canvas: &mut Canvas<'_>, _frame: &FrameInfo) -> anyhow::Result<()> {
        canvas.fill(self.color);
        Ok(())
    }

    fn name(&self) -> &str {
        "Solid"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            primary_color: true,
            ..Capabilities::default()
        }
    }

    fn param(&self, kind: ParamKind) -> Option<Param> {
        match kind {
            ParamKind::PrimaryColor => Some(Param::PrimaryColor(self.color)),
            _ => None,
        }
    }

    fn set_param(&mut self, param: Param) -> bool {
        match param {
            Param::PrimaryColor(color) => {
                self.color = color;
                true
            }
            _ => false,
        }
    }

    fn spec(&self) -> Option<AnimationSpec> {
        Some(AnimationSpec::Solid { color: self.color })
    }
}
