pub mod common {
    tonic::include_proto!("tablebook.common");
}

pub mod reservation_service {
    tonic::include_proto!("tablebook.reservation_service");
}

pub mod submission_service {
    tonic::include_proto!("tablebook.submission_service");
}
