#![cfg(target_arch = "wasm32")]

use crate::config::StepperConfig;
use crate::document::{Document, Notice, TrackId};
use crate::engine::{model_catalog, ModelInfo};
use crate::force::Expr;
use crate::models::InitialValues;
use crate::timeline::VideoClip;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn available_models() -> js_sys::Array {
    let out = js_sys::Array::new();
    for info in model_catalog() {
        out.push(&model_info_to_js(info));
    }
    out
}

#[wasm_bindgen]
pub fn stepper_defaults() -> JsValue {
    serde_wasm_bindgen::to_value(&StepperConfig::default()).unwrap_or(JsValue::NULL)
}

fn model_info_to_js(info: &ModelInfo) -> JsValue {
    let obj = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("id"), &JsValue::from_str(info.id));
    let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("name"), &JsValue::from_str(info.name));
    let _ = js_sys::Reflect::set(
        &obj,
        &JsValue::from_str("description"),
        &JsValue::from_str(info.description),
    );
    JsValue::from(obj)
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Function pair of a model: `{ f1: Expr, f2: Expr }`.
#[derive(Debug, Deserialize)]
struct FunctionPair {
    f1: Expr,
    f2: Expr,
}

#[wasm_bindgen]
pub struct WasmDocument {
    doc: Document,
}

#[wasm_bindgen]
impl WasmDocument {
    #[wasm_bindgen(constructor)]
    pub fn new(frame_count: usize, frame_duration: f64) -> WasmDocument {
        WasmDocument { doc: Document::new(VideoClip::new(frame_count, frame_duration)) }
    }

    #[wasm_bindgen(js_name = "fromYaml")]
    pub fn from_yaml(yaml: &str) -> Result<WasmDocument, JsValue> {
        let doc = Document::load(yaml).map_err(js_err)?;
        Ok(WasmDocument { doc })
    }

    pub fn save(&self) -> Result<String, JsValue> {
        self.doc.save().map_err(js_err)
    }

    #[wasm_bindgen(js_name = "loadTracks")]
    pub fn load_tracks(&mut self, yaml: &str) -> Result<Vec<usize>, JsValue> {
        self.doc.load_tracks(yaml).map_err(js_err)
    }

    pub fn len(&self) -> usize {
        self.doc.tracks().len()
    }

    #[wasm_bindgen(js_name = "addModel")]
    pub fn add_model(&mut self, name: &str, model_id: &str) -> Result<usize, JsValue> {
        self.doc.add_model_by_id(name, model_id).map_err(js_err)
    }

    #[wasm_bindgen(js_name = "addPointMass")]
    pub fn add_point_mass(&mut self, name: &str) -> usize {
        self.doc.add_point_mass(name)
    }

    #[wasm_bindgen(js_name = "markStep")]
    pub fn mark_step(&mut self, id: TrackId, frame: usize, x: f64, y: f64) -> Result<(), JsValue> {
        self.doc.mark_step(id, frame, nalgebra::Point2::new(x, y)).map_err(js_err)
    }

    pub fn set_functions(&mut self, id: TrackId, pair: JsValue) -> Result<(), JsValue> {
        let pair: FunctionPair = serde_wasm_bindgen::from_value(pair)
            .map_err(|e| JsValue::from_str(&format!("invalid functions: {}", e)))?;
        self.doc.set_functions(id, pair.f1, pair.f2).map_err(js_err)
    }

    pub fn set_initial_values(&mut self, id: TrackId, initial: JsValue) -> Result<(), JsValue> {
        let initial: InitialValues = serde_wasm_bindgen::from_value(initial)
            .map_err(|e| JsValue::from_str(&format!("invalid initial values: {}", e)))?;
        self.doc.set_initial_values(id, initial).map_err(js_err)
    }

    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config: StepperConfig = serde_wasm_bindgen::from_value(config)
            .map_err(|e| JsValue::from_str(&format!("invalid config: {}", e)))?;
        self.doc.set_config(config).map_err(js_err)
    }

    pub fn set_mass(&mut self, id: TrackId, mass: f64) -> Result<(), JsValue> {
        self.doc.set_mass(id, mass).map_err(js_err)
    }

    pub fn set_frame(&mut self, frame: usize) -> Result<(), JsValue> {
        self.doc.set_frame(frame).map_err(js_err)
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.doc.set_playing(playing);
    }

    pub fn set_start_frame(&mut self, id: TrackId, frame: usize) -> Result<(), JsValue> {
        self.doc.set_start_frame(id, frame).map_err(js_err)
    }

    pub fn set_end_frame(&mut self, id: TrackId, frame: usize) -> Result<(), JsValue> {
        self.doc.set_end_frame(id, frame).map_err(js_err)
    }

    pub fn add_particle(&mut self, system: TrackId, particle: TrackId) -> Result<(), JsValue> {
        self.doc.add_particle(system, particle).map_err(js_err)
    }

    pub fn remove_particle(&mut self, system: TrackId, particle: TrackId) -> Result<(), JsValue> {
        self.doc.remove_particle(system, particle).map_err(js_err)
    }

    pub fn set_booster(&mut self, particle: TrackId, booster: Option<usize>) -> Result<(), JsValue> {
        self.doc.set_booster(particle, booster).map_err(js_err)
    }

    pub fn set_reference_frame(&mut self, origin: Option<usize>) -> Result<(), JsValue> {
        match origin {
            Some(id) => self.doc.set_reference_frame(id).map_err(js_err),
            None => {
                self.doc.clear_reference_frame();
                Ok(())
            }
        }
    }

    /// Sub-step trace of a track as `[x0, y0, x1, y1, ...]` image coordinates.
    /// Off-screen samples are `NaN`.
    pub fn trace(&self, id: TrackId) -> Vec<f32> {
        let Some(trace) = self.doc.trace(id) else {
            return Vec::new();
        };
        trace
            .xs()
            .iter()
            .zip(trace.ys())
            .flat_map(|(x, y)| [*x as f32, *y as f32])
            .collect()
    }

    /// Image position of every track at `frame`, `NaN` where there is none.
    pub fn positions(&self, frame: usize) -> Vec<f32> {
        (0..self.doc.tracks().len())
            .flat_map(|id| match self.doc.image_position(id, frame) {
                Some(p) => [p.x as f32, p.y as f32],
                None => [f32::NAN, f32::NAN],
            })
            .collect()
    }

    #[wasm_bindgen(js_name = "dataTable")]
    pub fn data_table(&self, id: TrackId) -> Result<JsValue, JsValue> {
        let rows = self.doc.data_table(id).map_err(js_err)?;
        serde_wasm_bindgen::to_value(&rows).map_err(js_err)
    }

    /// Drains off-screen warnings as track names.
    pub fn take_warnings(&mut self) -> js_sys::Array {
        let out = js_sys::Array::new();
        for notice in self.doc.take_notices() {
            match notice {
                Notice::OffScreen { name, .. } => out.push(&JsValue::from_str(&name)),
            };
        }
        out
    }

    pub fn repaint_count(&self) -> usize {
        self.doc.paint_monitor().repaint_count()
    }
}
