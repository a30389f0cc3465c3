use std::fmt;

use tryon_contracts::GarmentCategory;

use crate::classify::SynthesisResult;
use crate::normalizer::EncodedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Person,
    Garment,
}

impl ImageSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Garment => "garment",
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one try-on session has selected so far, plus the single-flight
/// gate for synthesis requests.
#[derive(Debug, Default)]
pub struct SessionState {
    person_image: Option<EncodedImage>,
    garment_image: Option<EncodedImage>,
    category: GarmentCategory,
    last_result: Option<SynthesisResult>,
    request_in_flight: bool,
    settled_requests: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn person_image(&self) -> Option<&EncodedImage> {
        self.person_image.as_ref()
    }

    pub fn garment_image(&self) -> Option<&EncodedImage> {
        self.garment_image.as_ref()
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&EncodedImage> {
        match slot {
            ImageSlot::Person => self.person_image(),
            ImageSlot::Garment => self.garment_image(),
        }
    }

    pub fn category(&self) -> GarmentCategory {
        self.category
    }

    pub fn last_result(&self) -> Option<&SynthesisResult> {
        self.last_result.as_ref()
    }

    pub fn request_in_flight(&self) -> bool {
        self.request_in_flight
    }

    /// Number of admitted requests whose in-flight flag has been released.
    pub fn settled_requests(&self) -> u64 {
        self.settled_requests
    }

    /// How many of the two input images are selected.
    pub fn ready_count(&self) -> u8 {
        u8::from(self.person_image.is_some()) + u8::from(self.garment_image.is_some())
    }

    pub fn is_ready(&self) -> bool {
        self.ready_count() == 2
    }

    pub fn set_person_image(&mut self, image: EncodedImage) {
        self.person_image = Some(image);
    }

    pub fn set_garment_image(&mut self, image: EncodedImage) {
        self.garment_image = Some(image);
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: EncodedImage) {
        match slot {
            ImageSlot::Person => self.set_person_image(image),
            ImageSlot::Garment => self.set_garment_image(image),
        }
    }

    pub fn clear_person_image(&mut self) {
        self.person_image = None;
    }

    pub fn clear_garment_image(&mut self) {
        self.garment_image = None;
    }

    pub fn clear_image(&mut self, slot: ImageSlot) {
        match slot {
            ImageSlot::Person => self.clear_person_image(),
            ImageSlot::Garment => self.clear_garment_image(),
        }
    }

    pub fn set_category(&mut self, category: GarmentCategory) {
        self.category = category;
    }

    pub fn set_result(&mut self, result: SynthesisResult) {
        self.last_result = Some(result);
    }

    /// Drops the last result and keeps both images for another attempt.
    pub fn clear_result(&mut self) {
        self.last_result = None;
    }

    /// The only admission gate for synthesis requests. Returns `false`
    /// without touching anything when a request is already in flight.
    pub fn try_begin_request(&mut self) -> bool {
        if self.request_in_flight {
            return false;
        }
        self.request_in_flight = true;
        true
    }

    pub fn end_request(&mut self) {
        self.request_in_flight = false;
        self.settled_requests += 1;
    }
}
