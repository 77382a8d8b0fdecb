use crate::oracle::MoveRequest;
use crate::types::Position;

/// Builds the user message sent to a text-based move source.
pub fn render(request: &MoveRequest) -> String {
    format!(
        "You are the AI player in a game of Othello. Based on the current board and the legal moves, \
         suggest the best move in JSON format.\n\
         The board is an 8x8 grid where 'B' is a black stone, 'W' is a white stone and '.' is an empty square.\n\
         Your stones are '{letter}'.\n\
         \n\
         Board:\n\
         {grid}\
         Legal moves:\n\
         [{moves}]\n\
         \n\
         Choose your move from the legal moves.\n\
         Reply with JSON in exactly this form and nothing else:\n\
         {{\"row\": <row>, \"col\": <col>}}",
        letter = request.side.letter(),
        grid = request.grid,
        moves = legal_moves_text(&request.legal_moves),
    )
}

/// `{"row": r, "col": c}` entries separated by `, `.
pub fn legal_moves_text(moves: &[Position]) -> String {
    moves
        .iter()
        .map(|mv| format!("{{\"row\": {}, \"col\": {}}}", mv.row, mv.col))
        .collect::<Vec<_>>()
        .join(", ")
}
